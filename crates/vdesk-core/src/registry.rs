//! Desktop enumeration, numbering and switching.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use vdesk_ids::DesktopId;
use vdesk_shell::{Error, Result};

use crate::shared::{Shared, position, wide};

/// A desktop with its current number.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Desktop {
    /// Stable identifier.
    pub id: DesktopId,
    /// 0-based position.
    pub number: usize,
    /// User-assigned name.
    pub name: Option<String>,
}

/// Desktop registry handle. Cheap to clone.
#[derive(Clone)]
pub struct Registry {
    /// Accessor state.
    shared: Arc<Shared>,
}

impl Registry {
    /// Handle over `shared`.
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Number of desktops.
    pub fn count(&self) -> Result<usize> {
        Ok(self.shared.desktops()?.len())
    }

    /// Ordered snapshot of every desktop.
    pub fn desktops(&self) -> Result<Vec<Desktop>> {
        Ok(self
            .shared
            .desktops()?
            .iter()
            .enumerate()
            .map(|(number, d)| Desktop {
                id: d.id,
                number,
                name: d.name.clone(),
            })
            .collect())
    }

    /// Identifier of desktop `number`.
    pub fn id_by_number(&self, number: usize) -> Result<DesktopId> {
        let desktops = self.shared.desktops()?;
        desktops
            .get(number)
            .map(|d| d.id)
            .ok_or_else(|| Error::NoSuchNumber {
                number: wide(number),
                count: desktops.len(),
            })
    }

    /// Number of desktop `id`.
    pub fn number_by_id(&self, id: DesktopId) -> Result<usize> {
        self.shared.number_of(id)
    }

    /// Identifier of the current desktop.
    pub fn current_id(&self) -> Result<DesktopId> {
        self.shared.current()
    }

    /// Number of the current desktop.
    pub fn current_number(&self) -> Result<usize> {
        let current = self.shared.current()?;
        match self.shared.number_of(current) {
            Err(Error::DesktopNotFound(_)) => {
                // The list and the current desktop disagree; re-read both.
                self.shared.cache.write().invalidate_all();
                let current = self.shared.current()?;
                self.shared.number_of(current)
            }
            other => other,
        }
    }

    /// Request a switch to desktop `number`.
    ///
    /// Returns once the shell accepted the request; completion is observed
    /// through notifications.
    pub fn switch_to(&self, number: usize) -> Result<()> {
        let id = self.shared.desktop_at(number)?;
        debug!(number, %id, "switching desktop");
        self.shared.interop.switch_desktop(id)?;
        self.shared.cache.write().invalidate_current();
        Ok(())
    }

    /// Name of desktop `number`, if it has one.
    pub fn name(&self, number: usize) -> Result<Option<String>> {
        let desktops = self.shared.desktops()?;
        desktops
            .get(number)
            .map(|d| d.name.clone())
            .ok_or_else(|| Error::InvalidNumber {
                number: wide(number),
                count: desktops.len(),
            })
    }

    /// Rename desktop `number`.
    pub fn rename(&self, number: usize, name: &str) -> Result<()> {
        let id = self.shared.desktop_at(number)?;
        let owned = name.to_string();
        self.shared
            .interop
            .call("rename_desktop", move |s| s.rename_desktop(id, &owned))?;
        self.shared.cache.write().invalidate_desktops();
        Ok(())
    }

    /// Append a desktop and return its number.
    pub fn create(&self) -> Result<usize> {
        let (id, desktops) = self.shared.interop.call("create_desktop", |s| {
            let id = s.create_desktop()?;
            Ok((id, s.desktops()?))
        })?;
        self.shared.cache.write().invalidate_desktops();
        position(&desktops, id).ok_or(Error::DesktopNotFound(id))
    }

    /// Remove desktop `number`, moving its windows to `fallback`.
    pub fn remove(&self, number: usize, fallback: usize) -> Result<()> {
        if number == fallback {
            return Err(Error::InvalidArgument(format!(
                "cannot remove desktop {number} onto itself"
            )));
        }
        let id = self.shared.desktop_at(number)?;
        let fallback_id = self.shared.desktop_at(fallback)?;
        debug!(number, fallback, "removing desktop");
        self.shared
            .interop
            .call("remove_desktop", move |s| s.remove_desktop(id, fallback_id))?;
        self.shared.cache.write().invalidate_all();
        Ok(())
    }

    /// Drop every cached entry.
    pub fn refresh(&self) {
        self.shared.cache.write().invalidate_all();
    }
}
