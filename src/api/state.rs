use tokio::sync::watch;

use crate::control::StatusSnapshot;
use crate::detect::IncidentLog;

#[derive(Clone)]
pub struct AppState {
    pub status: watch::Receiver<StatusSnapshot>,
    pub history: IncidentLog,
}
