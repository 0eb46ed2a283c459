pub mod campaign;
pub mod job;
pub mod lead;
pub mod loaders;
pub mod template;

pub use campaign::{Campaign, CampaignStage};
pub use job::{RecordOutcome, RejectedRecord, ScrapeJob, SendJob, StopReason};
pub use lead::{Dataset, LeadRecord, Rejection, SendStatus, StatusUpdate};
pub use loaders::load_template;
pub use template::{EmailTemplate, RenderedEmail};
