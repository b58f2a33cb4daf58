use clap::Parser;
use exam_flow::Context;
use exam_solver_service::{
    ExamServices, Settings,
    artifact::save_answers,
    config::{QuestionFilter, ocr_from_env},
    driver::{SolveEvent, solve_questions},
    extract::{TextExtractor, is_failure_sentinel},
    language::LanguageChoice,
    models::INTERRUPTED_ANSWER,
    openrouter::OpenRouterClient,
    segmenter::{SegmentMode, segment_with_filter},
    tasks::{
        session_keys,
        segment_questions::select_questions,
        solve_questions::{NO_QUESTIONS_MESSAGE, STOPPED_MESSAGE},
        validate_questions::validate_all,
    },
    telemetry::init_cli_tracing,
};
use std::io::Write;
use std::path::PathBuf;

/// Solve the maths questions in an exam PDF, streaming answers to stdout
#[derive(Parser, Debug)]
#[command(name = "solve-pdf", version)]
struct Args {
    /// Exam paper to solve
    pdf: PathBuf,

    /// Answer language: auto, en, ta or si
    #[arg(short, long, default_value = "auto")]
    language: LanguageChoice,

    /// Overrides SEGMENT_MODE
    #[arg(long)]
    segment_mode: Option<SegmentMode>,

    /// Overrides MAX_QUESTIONS
    #[arg(long)]
    max_questions: Option<usize>,

    /// Directory for answers.txt, overriding ANSWERS_DIR
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Print the extracted text and exit
    #[arg(long)]
    extract_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_cli_tracing();
    let args = Args::parse();

    if args.extract_only {
        // The key is only needed when OCR_BACKEND selects the vision model
        let vision_client = std::env::var("OPENROUTER_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(OpenRouterClient::new);
        let extractor = TextExtractor::new(ocr_from_env()?, vision_client);
        let text = extractor.extract(&args.pdf).await;
        if is_failure_sentinel(&text) {
            anyhow::bail!("{text}");
        }
        println!("{text}");
        return Ok(());
    }

    let mut settings = Settings::from_env()?;
    if let Some(mode) = args.segment_mode {
        settings.segment_mode = mode;
    }
    if let Some(max) = args.max_questions.filter(|max| *max > 0) {
        settings.max_questions = max;
    }
    if let Some(dir) = args.output_dir {
        settings.answers_dir = dir;
    }

    let services = ExamServices::from_settings(&settings).await?;

    let text = services.extractor.extract(&args.pdf).await;
    if is_failure_sentinel(&text) {
        anyhow::bail!("{text}");
    }

    let language = services.detector.resolve(args.language, &text);
    eprintln!("Language: {}", language.name());

    let segmentation = segment_with_filter(&text, settings.segment_mode);
    let mut questions =
        select_questions(&segmentation, settings.question_filter, settings.max_questions);
    let context = Context::new();
    if settings.question_filter == QuestionFilter::Llm {
        let (accepted, failed) = validate_all(services.validator.as_ref(), questions).await;
        if failed {
            anyhow::bail!("Question validation failed");
        }
        questions = accepted;
    }
    if questions.is_empty() {
        println!("{NO_QUESTIONS_MESSAGE}");
        return Ok(());
    }
    eprintln!("Solving {} questions (Ctrl-C to stop)", questions.len());

    let stop = context.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.set(session_keys::STOP_REQUESTED, true).await;
        }
    });

    let outcome = solve_questions(
        services.generator.as_ref(),
        &questions,
        language.name(),
        services.options.syllabus.as_deref(),
        &context,
        |event| {
            let mut stdout = std::io::stdout().lock();
            let _ = match event {
                SolveEvent::Started { index, question } => {
                    writeln!(stdout, "\n### Q{index}: {question}\n")
                }
                SolveEvent::Fragment { text, .. } => write!(stdout, "{text}"),
                SolveEvent::Finished(record) if record.answer == INTERRUPTED_ANSWER => {
                    writeln!(stdout, "{}", record.answer)
                }
                SolveEvent::Finished(_) => writeln!(stdout),
            };
            let _ = stdout.flush();
        },
    )
    .await;

    if outcome.stopped {
        eprintln!("{STOPPED_MESSAGE}");
    }
    if !outcome.answers.is_empty() {
        let path = save_answers(&settings.answers_dir, &outcome.answers).await?;
        eprintln!("Answers saved to {}", path.display());
    }

    Ok(())
}
