// Application state - the one session service handed to the rendering layer
use crate::application::connection_manager::{ConnectionManager, ConnectionStatus};
use crate::application::session::SessionHandle;
use crate::application::transport::Transport;
use crate::domain::panel::{PanelId, PanelTree, SplitDirection};
use crate::domain::telemetry::ControlUpdate;
use crate::presentation::chart_view::{ChartFrame, MAX_RENDER_POINTS};
use std::sync::{Arc, PoisonError, RwLock};

pub struct AppState {
    pub session: SessionHandle,
    pub connection: ConnectionManager,
    panels: RwLock<PanelTree>,
}

impl AppState {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let session = SessionHandle::default();
        let connection = ConnectionManager::new(endpoint, transport, session.clone());
        Self::with_connection(session, connection)
    }

    pub fn with_connection(session: SessionHandle, connection: ConnectionManager) -> Self {
        Self {
            session,
            connection,
            panels: RwLock::new(PanelTree::new()),
        }
    }

    pub fn start(&self) {
        self.connection.start();
    }

    pub async fn stop(&self) {
        self.connection.stop().await;
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn send_control(&self, update: &ControlUpdate) -> bool {
        self.connection.send_control(update)
    }

    /// Snapshot of the current layout.
    pub fn panels(&self) -> PanelTree {
        self.panels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn split_panel(&self, leaf: PanelId, direction: SplitDirection) -> PanelTree {
        self.update_panels(|tree| tree.split(leaf, direction))
    }

    pub fn close_panel(&self, leaf: PanelId) -> PanelTree {
        self.update_panels(|tree| tree.close(leaf))
    }

    pub fn assign_series(&self, leaf: PanelId, key: &str) -> PanelTree {
        self.update_panels(|tree| tree.assign_series(leaf, key))
    }

    pub fn unassign_series(&self, leaf: PanelId, key: &str) -> PanelTree {
        self.update_panels(|tree| tree.unassign_series(leaf, key))
    }

    pub fn resize_panel(&self, split: PanelId, ratio: f64) -> PanelTree {
        self.update_panels(|tree| tree.set_ratio(split, ratio))
    }

    /// Chart data for one pane, empty if the pane no longer exists.
    pub fn chart_for(&self, leaf: PanelId) -> ChartFrame {
        let keys = self
            .panels()
            .leaf(leaf)
            .map(|l| l.selected_series().to_vec())
            .unwrap_or_default();
        ChartFrame::build(self.session.read().series(), &keys, MAX_RENDER_POINTS)
    }

    fn update_panels(&self, change: impl FnOnce(&PanelTree) -> PanelTree) -> PanelTree {
        let mut panels = self.panels.write().unwrap_or_else(PoisonError::into_inner);
        let next = change(&panels);
        *panels = next.clone();
        next
    }
}
