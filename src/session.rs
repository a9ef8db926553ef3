use crate::model::NodeId;

/// Mutable selection state for one reporting workflow: which report and
/// which markup set new work lands in, plus whether the reporting GUI is
/// currently showing.
///
/// Both pointers are single-valued registers that change only through the
/// setters here; `None` means "no selection" and is a valid state every
/// consumer handles. A pointer can go stale if its target leaves the scene
/// without a NodeRemoved event reaching the router, so consumers look the
/// target up before use.
#[derive(Debug, Default)]
pub struct ReportingSession {
    active_report_id: Option<NodeId>,
    active_markup_id: Option<NodeId>,
    gui_hidden: bool,
}

impl ReportingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_report(&self) -> Option<&NodeId> {
        self.active_report_id.as_ref()
    }

    pub fn set_active_report(&mut self, id: Option<NodeId>) {
        log::debug!(
            "active report -> {}",
            id.as_ref().map_or("none", NodeId::as_str)
        );
        self.active_report_id = id;
    }

    pub fn active_markup(&self) -> Option<&NodeId> {
        self.active_markup_id.as_ref()
    }

    pub fn set_active_markup(&mut self, id: Option<NodeId>) {
        log::debug!(
            "active markup set -> {}",
            id.as_ref().map_or("none", NodeId::as_str)
        );
        self.active_markup_id = id;
    }

    pub fn gui_hidden(&self) -> bool {
        self.gui_hidden
    }

    pub fn set_gui_hidden(&mut self, hidden: bool) {
        self.gui_hidden = hidden;
    }
}
