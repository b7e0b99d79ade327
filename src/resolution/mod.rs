pub mod executor;
pub mod fallback;
pub mod plan;

pub use executor::{
    ActionOutcome, ActionState, ApprovalGate, ApproveAll, DenyAll, ExecuteOptions, FinalStatus,
    ResolutionExecutor, ResolutionResult, Strategy,
};
pub use fallback::{FallbackAllocator, DEFAULT_MAX_ATTEMPTS};
pub use plan::{
    classify_process, ActionKind, ResolutionAction, ResolutionPlan, ResolutionPlanner, RiskLevel,
};
