#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Dispatch,
    Process,
    Report,
}

/// Progress message sent from the worker to the shell
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStatus {
    pub progress: f32,
    pub stage: Stage,
    /// Id of the measurement or file being handled
    pub current: String,
}

impl WorkerStatus {
    pub fn new(progress: f32, stage: Stage, current: &str) -> Self {
        Self {
            progress,
            stage,
            current: current.to_string(),
        }
    }
}
