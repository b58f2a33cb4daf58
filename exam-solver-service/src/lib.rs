pub mod artifact;
pub mod config;
pub mod driver;
pub mod extract;
pub mod generator;
pub mod language;
pub mod models;
pub mod openrouter;
pub mod segmenter;
pub mod service;
pub mod tasks;
pub mod telemetry;
pub mod workflow;

pub use config::Settings;
pub use service::{AppState, build_router, create_app};
pub use workflow::{
    ExamServices, SolverOptions, build_exam_workflow, create_exam_session, create_flow_runner,
};
pub use models::*;
