pub mod page;
pub mod resume;

pub use page::{PageError, ResumePage};
pub use resume::{
    ChangeDetail, ChangeId, FinalAssetsResult, GeneratedAssets, JobDetails, TextGenerationResult,
};
