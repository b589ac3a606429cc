//! Command-line frontend for the findata report agent
//!
//! One-shot mode runs a single request and exits with a status code; the
//! default mode is an interactive loop. Both drive the same engine and
//! differ only in how lifecycle events are drained.

use clap::Parser;
use findata_agent::{AgentConfig, AgentEngine, ChannelSink, LifecycleEvent, StopFlag};
use findata_llm::{LLMProvider, OpenAIConfig, OpenAIProvider};
use findata_utils::Prefs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

const PREFS_FILE: &str = "config.json";

#[derive(Parser, Debug)]
#[command(name = "findata")]
#[command(about = "Natural-language financial report agent", long_about = None)]
struct Args {
    /// Generator model name (overrides environment and preferences)
    #[arg(short, long)]
    model: Option<String>,

    /// Run a single request and exit
    #[arg(short, long)]
    intent: Option<String>,

    /// Per-script execution timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    findata_utils::init_tracing();

    let args = Args::parse();
    let prefs = Prefs::load(Path::new(PREFS_FILE));

    let mut config = AgentConfig::from_env()?;
    if let Some(model) = prefs.model.clone() {
        config.model = model;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(secs) = args.timeout_secs {
        config.exec_timeout = Duration::from_secs(secs);
    }
    config.validate()?;

    let provider = OpenAIProvider::with_config(
        OpenAIConfig::new(config.api_key.clone()).with_api_base(config.api_base.clone()),
    )?;
    info!(model = %config.model, provider = provider.name(), "Starting findata agent");

    let engine = AgentEngine::new(Arc::new(provider), Arc::new(config));

    if let Some(intent) = args.intent {
        let success = run_request(&engine, &prefs, &intent).await;
        std::process::exit(i32::from(!success));
    }

    repl(&engine, &prefs).await
}

/// Interactive loop: one request per line, `exit`/`quit` to leave
async fn repl(engine: &AgentEngine, prefs: &Prefs) -> anyhow::Result<()> {
    println!("findata 金融数据分析助手 (输入 exit 退出)");
    println!("示例: 导出贵州茅台2023年1月的日线到Excel并画图");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n{} > ", prefs.user_avatar);
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };

        let Some(line) = line else { break };
        let request = line.trim();
        if request.is_empty() {
            continue;
        }
        if request == "exit" || request == "quit" {
            break;
        }

        run_request(engine, prefs, request).await;
    }

    Ok(())
}

/// Run one request, printing lifecycle events as they arrive
async fn run_request(engine: &AgentEngine, prefs: &Prefs, request: &str) -> bool {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let agent_avatar = prefs.agent_avatar.clone();

    let printer = tokio::spawn(async move {
        let mut streaming = false;
        while let Some(event) = rx.recv().await {
            match event {
                LifecycleEvent::ThoughtChunk(delta) => {
                    if !streaming {
                        print!("{agent_avatar} ");
                        streaming = true;
                    }
                    print!("{delta}");
                    let _ = std::io::stdout().flush();
                }
                LifecycleEvent::Thought(_) => {
                    if streaming {
                        println!();
                        streaming = false;
                    }
                }
                LifecycleEvent::Execution(code) => {
                    println!("--- 执行脚本 ---\n{code}\n---------------");
                }
                LifecycleEvent::Error(error) => {
                    println!("--- 执行出错 ---\n{error}\n---------------");
                }
                LifecycleEvent::Result { .. } => {}
            }
        }
    });

    let outcome = engine
        .run(request, &ChannelSink::new(tx), &StopFlag::new())
        .await;
    let _ = printer.await;

    if outcome.success {
        println!("[SUCCESS] {}", outcome.payload);
    } else {
        println!("[FAILURE] {}", outcome.payload);
    }
    outcome.success
}
