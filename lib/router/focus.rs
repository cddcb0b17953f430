//! Focus model and zone/trap navigation helpers (spec §4.7 "Focus model",
//! "Zone transitions", "Traps").
//!
//! Focus zones and traps form a tree, not a graph (spec §9 "Cycles"): the
//! only back-references — which zone or trap a focusable id lives in —
//! are derived fresh from [`MetadataBundle`] every frame rather than
//! stored here. [`FocusModel`] itself holds only the cross-frame state
//! that can't be derived: the currently focused id, which zone/trap is
//! active, and the "last focused id per zone" map used to restore focus
//! when re-entering a zone.

use std::collections::HashMap;

use crate::metadata::MetadataBundle;
use crate::vnode::ZoneNavigation;

/// Cross-frame focus bookkeeping the router owns. Everything else about
/// the focus graph (which ids exist, which zone/trap contains them) is
/// recomputed by the metadata collector every commit.
#[derive(Default)]
pub struct FocusModel {
    pub current: Option<String>,
    pub active_zone: Option<String>,
    pub active_trap: Option<String>,
    /// Focus captured immediately before the active trap activated, used
    /// as the fallback restore target if the trap carries no
    /// `returnFocusTo` (spec §4.3 "Traps").
    pre_trap_focus: Option<String>,
    /// Last focused id within each zone, so re-entering a zone restores
    /// it rather than defaulting to the zone's first item (spec §4.7
    /// "Zone transitions": "When focus returns to a zone within the same
    /// interaction cycle, the last id focused in that zone is restored").
    zone_last_focused: HashMap<String, String>,
    /// Per-trap activation state observed on the previous `sync`, used to
    /// detect the inactive→active and active→inactive edges.
    trap_was_active: HashMap<String, bool>,
}

/// Which zone or trap (if any) contains `id` as a directly-attributed
/// focusable, per the metadata collector's innermost-container
/// attribution (spec §4.3 "Attribution").
fn zone_of<'a>(meta: &MetadataBundle<'a>, id: &str) -> Option<&'a str> {
    meta.zones.iter().find(|(_, z)| z.focusable_ids.iter().any(|i| i == id)).map(|(zid, _)| zid.as_str())
}

impl FocusModel {
    /// Reconciles trap activation edges and prunes any stale bookkeeping
    /// for ids that disappeared from the committed tree. Called once per
    /// frame, before any event for that frame is dispatched.
    ///
    /// Returns the trap-caused focus change, if any, as `(new_focus,
    /// entered_trap)`; the caller is responsible for invoking the
    /// relevant `onEnter`/`onExit` callbacks.
    pub fn sync(&mut self, meta: &MetadataBundle) -> Option<String> {
        // Detect trap activation/deactivation edges.
        let mut activated: Option<String> = None;
        let mut deactivated: Option<(String, Option<String>)> = None;
        for (tid, trap) in meta.traps.iter() {
            let was = self.trap_was_active.get(tid).copied().unwrap_or(false);
            if trap.active && !was {
                activated = Some(tid.clone());
            } else if !trap.active && was {
                deactivated = Some((tid.clone(), trap.return_focus_to.clone()));
            }
        }
        self.trap_was_active = meta.traps.iter().map(|(k, v)| (k.clone(), v.active)).collect();

        if let Some(tid) = activated {
            self.pre_trap_focus = self.current.clone();
            self.active_trap = Some(tid.clone());
            let trap = &meta.traps[&tid];
            let target = trap
                .initial_focus
                .clone()
                .filter(|id| trap.focusable_ids.iter().any(|i| i == id))
                .or_else(|| trap.focusable_ids.first().cloned());
            self.current = target.clone();
            return target;
        }
        if let Some((tid, return_to)) = deactivated {
            if self.active_trap.as_deref() == Some(tid.as_str()) {
                self.active_trap = None;
                let target = return_to.or_else(|| self.pre_trap_focus.take());
                self.current = target.clone();
                return target;
            }
        }

        // Drop bookkeeping for ids/zones no longer present.
        self.zone_last_focused.retain(|zid, id| meta.zones.get(zid).is_some_and(|z| z.focusable_ids.iter().any(|i| i == id)));
        if let Some(id) = &self.current {
            if !meta.enabled.get(id).copied().unwrap_or(false) {
                self.current = None;
                self.active_zone = None;
            }
        }
        None
    }

    /// Computes the next focused id for Tab (`forward = true`) / Shift+Tab
    /// (`forward = false`), honoring an active trap (wraps always) or
    /// active zone (wraps only if configured; otherwise exits the zone to
    /// the next/previous global focusable id) ahead of unscoped global
    /// navigation.
    pub fn tab_target(&self, meta: &MetadataBundle, forward: bool) -> Option<String> {
        if let Some(tid) = &self.active_trap {
            let trap = meta.traps.get(tid)?;
            return step_wrapping(&trap.focusable_ids, self.current.as_deref(), forward);
        }
        if let Some(zid) = &self.active_zone {
            if let Some(zone) = meta.zones.get(zid) {
                if zone.wrap_around {
                    return step_wrapping(&zone.focusable_ids, self.current.as_deref(), forward);
                }
                if let Some(next) = step_clamped(&zone.focusable_ids, self.current.as_deref(), forward) {
                    return Some(next);
                }
                // Fell off the zone's edge without wrap: escape globally.
                return step_wrapping(meta.focusable_ids, self.current.as_deref(), forward);
            }
        }
        step_wrapping(meta.focusable_ids, self.current.as_deref(), forward)
    }

    /// Commits a focus change decided by `tab_target` (or any other
    /// navigation source), running zone `onExit`/`onEnter` as the active
    /// zone changes and recording the zone's last-focused id.
    pub fn set_focus(&mut self, target: Option<String>, meta: &MetadataBundle) {
        if let Some(old) = &self.current {
            if let Some(old_zone) = zone_of(meta, old) {
                self.zone_last_focused.insert(old_zone.to_string(), old.clone());
            }
        }
        let new_zone = target.as_deref().and_then(|id| zone_of(meta, id)).map(|z| z.to_string());
        if new_zone != self.active_zone {
            if let Some(old_zone) = &self.active_zone {
                if let Some(z) = meta.zones.get(old_zone) {
                    if let Some(cb) = &z.on_exit {
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
                    }
                }
            }
            if let Some(zid) = &new_zone {
                if let Some(z) = meta.zones.get(zid) {
                    if let Some(cb) = &z.on_enter {
                        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb()));
                    }
                }
            }
        }
        self.active_zone = new_zone;
        self.current = target;
    }

    /// Restores the last-focused id recorded for `zone_id`, if any,
    /// falling back to the zone's first focusable id.
    pub fn zone_entry_target(&self, meta: &MetadataBundle, zone_id: &str) -> Option<String> {
        let zone = meta.zones.get(zone_id)?;
        self.zone_last_focused
            .get(zone_id)
            .filter(|id| zone.focusable_ids.iter().any(|i| i == id.as_str()))
            .cloned()
            .or_else(|| zone.focusable_ids.first().cloned())
    }
}

/// One directional step through `ids`, wrapping past either end.
fn step_wrapping(ids: &[String], current: Option<&str>, forward: bool) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let idx = current.and_then(|c| ids.iter().position(|i| i == c));
    let next = match idx {
        None => {
            if forward {
                0
            } else {
                ids.len() - 1
            }
        }
        Some(i) => {
            if forward {
                (i + 1) % ids.len()
            } else {
                (i + ids.len() - 1) % ids.len()
            }
        }
    };
    Some(ids[next].clone())
}

/// One directional step through `ids` that returns `None` instead of
/// wrapping once the edge is reached.
fn step_clamped(ids: &[String], current: Option<&str>, forward: bool) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let idx = current.and_then(|c| ids.iter().position(|i| i == c))?;
    if forward {
        ids.get(idx + 1).cloned()
    } else {
        idx.checked_sub(1).and_then(|i| ids.get(i)).cloned()
    }
}

/// Grid-zone arrow stepping: vertical arrows move by `±columns`,
/// horizontal arrows by `±1`, never wrapping unless `wrap_around` is set
/// (spec §4.7 "Zones may be ... `grid`").
pub fn grid_step(ids: &[String], current: Option<&str>, delta: i32, wrap: bool) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let idx = current.and_then(|c| ids.iter().position(|i| i == c))? as i32;
    let len = ids.len() as i32;
    let mut next = idx + delta;
    if wrap {
        next = next.rem_euclid(len);
    } else if next < 0 || next >= len {
        return None;
    }
    ids.get(next as usize).cloned()
}

/// Linear-zone arrow stepping: up/left and down/right both step by one,
/// honoring `wrap_around`.
pub fn linear_step(ids: &[String], current: Option<&str>, forward: bool, wrap: bool) -> Option<String> {
    if wrap {
        step_wrapping(ids, current, forward)
    } else {
        step_clamped(ids, current, forward)
    }
}

pub fn navigation_of(meta: &MetadataBundle, zone_id: &str) -> Option<ZoneNavigation> {
    meta.zones.get(zone_id).map(|z| z.navigation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wrapping_wraps_past_the_end() {
        let ids = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(step_wrapping(&ids, Some("c"), true).as_deref(), Some("a"));
        assert_eq!(step_wrapping(&ids, Some("a"), false).as_deref(), Some("c"));
    }

    #[test]
    fn step_clamped_stops_at_the_end() {
        let ids = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(step_clamped(&ids, Some("c"), true), None);
        assert_eq!(step_clamped(&ids, Some("a"), false), None);
        assert_eq!(step_clamped(&ids, Some("a"), true).as_deref(), Some("b"));
    }

    #[test]
    fn grid_step_moves_by_columns_without_wrap() {
        let ids: Vec<String> = (0..6).map(|i| i.to_string()).collect();
        // 3 columns: index 1 + 3 = index 4.
        assert_eq!(grid_step(&ids, Some("1"), 3, false).as_deref(), Some("4"));
        assert_eq!(grid_step(&ids, Some("4"), 3, false), None);
    }
}
