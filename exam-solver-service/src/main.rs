use exam_solver_service::{Settings, create_app, telemetry::init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let port = settings.port;
    info!(
        model = %settings.model,
        ocr_backend = ?settings.ocr.backend,
        segment_mode = ?settings.segment_mode,
        question_filter = ?settings.question_filter,
        max_questions = settings.max_questions,
        "Configuration loaded"
    );

    let app = create_app(settings).await?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    let addr = listener.local_addr()?;

    info!("Exam Solver Service starting on {}", addr);
    info!("Upload page available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
