//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod analytics_repository;
mod group_directory;
mod job_queue;
mod job_store;
mod mailer;
mod prompt_repository;
mod response_repository;
mod settings_repository;
mod suggestion_repository;
mod token_repository;

#[cfg(test)]
pub use analytics_repository::MockTokenAnalyticsRepository;
pub use analytics_repository::{
    AnalyticsRepositoryError, FixtureTokenAnalyticsRepository, TokenAnalyticsRepository,
};
#[cfg(test)]
pub use group_directory::MockGroupDirectory;
pub use group_directory::{
    FixtureGroupDirectory, GroupDirectory, GroupDirectoryError, GroupMember,
};
#[cfg(test)]
pub use job_queue::MockJobQueue;
pub use job_queue::{FixtureJobQueue, JobQueue, JobQueueError};
#[cfg(test)]
pub use job_store::MockJobStore;
pub use job_store::{FixtureJobStore, JobCompletion, JobStore, JobStoreError};
#[cfg(test)]
pub use mailer::MockMailer;
pub use mailer::{EmailMessage, EmailPurpose, EmailReceipt, FixtureMailer, Mailer, MailerError};
#[cfg(test)]
pub use prompt_repository::MockPromptRepository;
pub use prompt_repository::{FixturePromptRepository, PromptRepository, PromptRepositoryError};
#[cfg(test)]
pub use response_repository::MockResponseRepository;
pub use response_repository::{
    FixtureResponseRepository, ResponseRepository, ResponseRepositoryError,
};
#[cfg(test)]
pub use settings_repository::MockSettingsRepository;
pub use settings_repository::{
    FixtureSettingsRepository, SettingsRepository, SettingsRepositoryError,
};
#[cfg(test)]
pub use suggestion_repository::MockSuggestionRepository;
pub use suggestion_repository::{
    FixtureSuggestionRepository, SuggestionRepository, SuggestionRepositoryError,
};
#[cfg(test)]
pub use token_repository::MockTokenRepository;
pub use token_repository::{FixtureTokenRepository, TokenRepository, TokenRepositoryError};
