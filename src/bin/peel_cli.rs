//! 终端客户端
//!
//! 逐行读取输入，按当前阶段解释；以 `/` 开头的是命令：
//! - `/upload <path>` 上传 PDF 笔记
//! - `/chat [mode] <text>` 自由聊天（mode: general / essay / sbq / topic / feedback）
//! - `/restart` 重新开始
//! - `/quit` 退出

use std::path::Path;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use peel_tutor::models::{EvidenceChoice, Mode, Stage};
use peel_tutor::utils::logging;
use peel_tutor::workflow::render;
use peel_tutor::{AppResult, Config, HttpTutorApi, Session, TutorFlow};

/// 一行输入对应的动作
enum Command {
    Quit,
    Restart,
    Upload(String),
    Chat { mode: Option<String>, text: String },
    Input(String),
}

fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Input(line.to_string());
    };

    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    match name {
        "quit" | "exit" => Command::Quit,
        "restart" => Command::Restart,
        "upload" => Command::Upload(args.to_string()),
        "chat" => {
            let (first, tail) = args.split_once(' ').unwrap_or((args, ""));
            if Mode::parse(Some(first)).name() == first {
                Command::Chat {
                    mode: Some(first.to_string()),
                    text: tail.trim().to_string(),
                }
            } else {
                Command::Chat {
                    mode: None,
                    text: args.to_string(),
                }
            }
        }
        _ => Command::Input(line.to_string()),
    }
}

fn mime_for(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// 按阶段解释普通输入
async fn handle_input(flow: &TutorFlow<HttpTutorApi>, input: &str) -> AppResult<Session> {
    let session = flow.snapshot();
    match session.stage() {
        Stage::Init => flow.begin(),
        Stage::Question => flow.generate_points(input).await,
        Stage::Point => match input.parse::<usize>() {
            Ok(n) if n >= 1 => flow.select_point(n - 1).await,
            _ => flow.choose_point(input).await,
        },
        Stage::Evidence => match input.to_ascii_lowercase().as_str() {
            "a" => flow.select_evidence(EvidenceChoice::Weak),
            "b" => flow.select_evidence(EvidenceChoice::Strong),
            "keep" => flow.confirm_weak_evidence(),
            _ => Ok(session),
        },
        Stage::Explanation => flow.submit_explanation(input).await,
        Stage::Done => match input.to_ascii_lowercase().as_str() {
            "another" => flow.another_paragraph(),
            "restart" => flow.start_over(),
            _ => Ok(session),
        },
    }
}

async fn stream_chat(flow: &TutorFlow<HttpTutorApi>, mode: Option<&str>, text: &str) -> AppResult<()> {
    let mut stream = flow.chat(text, mode).await?;
    let mut stdout = tokio::io::stdout();

    while let Some(piece) = stream.next().await {
        let piece = piece?;
        let _ = stdout.write_all(piece.as_bytes()).await;
        let _ = stdout.flush().await;
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    logging::init(config.verbose_logging);

    let api = HttpTutorApi::new(&config.server_url)?;
    let flow = TutorFlow::new(api, &config);

    println!("{}", "=".repeat(60));
    println!("📝 PEEL Tutor - {}", config.server_url);
    println!("{}", "=".repeat(60));
    println!("{}", render(&flow.snapshot(), false));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match parse_command(&line) {
            Command::Quit => break,
            Command::Restart => flow.start_over().map(|_| ()),
            Command::Upload(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let name = Path::new(&path)
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or("notes.pdf")
                        .to_string();
                    flow.attach(&name, bytes, mime_for(&path)).await.map(|_| ())
                }
                Err(e) => {
                    println!("❌ 无法读取 {}: {}", path, e);
                    continue;
                }
            },
            Command::Chat { mode, text } => stream_chat(&flow, mode.as_deref(), &text).await,
            Command::Input(input) => handle_input(&flow, &input).await.map(|_| ()),
        };

        if let Err(e) = result {
            println!("❌ {}", e);
        }
        println!("{}", render(&flow.snapshot(), flow.is_busy()));
    }

    Ok(())
}
