use clap::Parser;
use diagnosis_client::{load_image, Covariate, FormController, HttpTransport, Submission};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "diagnose")]
#[command(version)]
#[command(about = "Submit an ultrasound scan for uterine abnormality prediction", long_about = None)]
struct Cli {
    /// Ultrasound image to submit
    image: PathBuf,

    /// Patient has unexplained infertility
    #[arg(long)]
    infertility: bool,

    /// Number of previous miscarriages
    #[arg(long, default_value_t = 0)]
    miscarriages: u32,

    /// Prediction endpoint URL
    #[arg(
        long,
        env = "DIAGNOSIS_ENDPOINT",
        default_value = "http://localhost:5000/api/predict"
    )]
    endpoint: String,

    /// Give up on the request after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Print the prediction as JSON instead of the rendered form
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let transport = match HttpTransport::new(&cli.endpoint, Duration::from_secs(cli.timeout_secs))
    {
        Ok(transport) => transport,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    let controller = FormController::new(transport);

    controller.set_covariate(Covariate::Infertility(cli.infertility));
    controller.set_covariate(Covariate::PriorMiscarriages(cli.miscarriages));

    let selected = load_image(&cli.image).and_then(|image| controller.select_image(image));
    if let Err(e) = selected {
        eprintln!("{}", e.user_message());
        return ExitCode::FAILURE;
    }

    let code = match controller.submit().await {
        Submission::Completed(result) if cli.json => match serde_json::to_string(&result) {
            Ok(json) => {
                println!("{}", json);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::FAILURE
            }
        },
        Submission::Completed(_) => {
            println!("{}", controller.render());
            ExitCode::SUCCESS
        }
        Submission::Failed(e) => {
            tracing::debug!("Submission failed: {:?}", e);
            eprintln!("{}", controller.render());
            ExitCode::FAILURE
        }
        other => {
            eprintln!("Submission did not run: {:?}", other);
            ExitCode::FAILURE
        }
    };

    controller.close();
    code
}
