pub mod answer;
pub mod crisis;
pub mod mirror;
pub mod profile;
pub mod progress;
pub mod question;

pub use answer::{AnswerResult, Outcome, ProgressEvent};
pub use crisis::{ActiveCrisis, CrisisPhase, CrisisStatus};
pub use profile::{LearnerContext, UserProfile};
pub use question::{NewQuestion, QuestionOrigin, QuestionRecord};
