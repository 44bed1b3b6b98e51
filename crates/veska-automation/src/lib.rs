pub mod extract;
pub mod planner;
pub mod playbook;
pub mod runner;
pub mod vision;

pub use extract::{extract_phone_number, format_phone};
pub use planner::UiPlanner;
pub use playbook::{Condition, OnFailure, Playbook, PlaybookStep, StepAction, WaitFor};
pub use runner::{PlaybookReport, PlaybookRunner, StepOutcome, StepStatus};
pub use vision::{ActionRecord, VisionAgent, VisionRunOutcome, VisionRunStatus};
