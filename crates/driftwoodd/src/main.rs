mod commands;
mod providers;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "driftwoodd")]
#[command(about = "宣言した状態へ、外部リソースを収束させ続ける。", long_about = None)]
struct Cli {
    /// デバッグログを出力
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// コントローラーを起動（Ctrl-C で停止し、状態を保存）
    Run {
        /// カタログファイル (XRD / Composition / ProviderConfig)
        #[arg(short, long, env = "DRIFTWOOD_CATALOG")]
        catalog: PathBuf,
        /// マニフェスト（YAMLファイルまたはディレクトリ）
        #[arg(short, long, env = "DRIFTWOOD_MANIFESTS")]
        manifests: Option<PathBuf>,
        /// 状態スナップショットの保存先（driftwood.kdl の store.snapshot より優先）
        #[arg(long, env = "DRIFTWOOD_STATE")]
        state: Option<PathBuf>,
        /// kind ごとのワーカー数
        #[arg(short, long, env = "DRIFTWOOD_WORKERS")]
        workers: Option<usize>,
        /// 再同期の間隔（例: 30s, 10m）
        #[arg(long, env = "DRIFTWOOD_RESYNC")]
        resync: Option<String>,
    },
    /// カタログとマニフェストを検証
    Validate {
        /// カタログファイル
        #[arg(short, long, env = "DRIFTWOOD_CATALOG")]
        catalog: PathBuf,
        /// マニフェスト（YAMLファイルまたはディレクトリ）
        #[arg(short, long)]
        manifests: Option<PathBuf>,
    },
    /// Composite を展開し、子リソースをYAMLで出力（ストアには書き込まない）
    Compose {
        /// カタログファイル
        #[arg(short, long, env = "DRIFTWOOD_CATALOG")]
        catalog: PathBuf,
        /// Composite を含むマニフェスト
        #[arg(long)]
        manifest: PathBuf,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // stdout は compose の出力に使うので、ログは stderr へ
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            catalog,
            manifests,
            state,
            workers,
            resync,
        } => {
            commands::run::handle(commands::run::RunArgs {
                catalog,
                manifests,
                state,
                workers,
                resync,
            })
            .await
        }
        Commands::Validate { catalog, manifests } => {
            commands::validate::handle(&catalog, manifests.as_deref())
        }
        Commands::Compose { catalog, manifest } => commands::compose::handle(&catalog, &manifest),
        Commands::Version => {
            println!("driftwoodd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
