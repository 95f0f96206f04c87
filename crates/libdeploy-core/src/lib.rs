pub mod artifact;
pub mod config;
pub mod deploy;
pub mod detect;
pub mod error;
pub mod filter;
pub mod layout;
pub mod locate;
pub mod orchestrator;
pub mod scan;
pub mod types;

pub use error::{DeployError, DetectionFailure, Interrupted, Result};
pub use orchestrator::{create_deployer, DeployRequest, DeploymentPlan, PlatformDeployer};
