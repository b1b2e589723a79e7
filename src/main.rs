// sshmanager - 命令行入口
//
// 用法: sshmanager <config.json>
// 从标准输入逐行读取指令，`:` 开头的是控制指令，其余作为远程命令执行

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use sshmanager::logging::{self, LogConfig};
use sshmanager::{CommandOutcome, ConnectionManager, SshConfig, SshError};

/// 一行输入解析后的指令
#[derive(Debug, PartialEq, Eq)]
enum Directive<'a> {
    Open,
    CloseSession,
    Reconnect,
    Upload { remote: &'a str, local: &'a str },
    Download { local: &'a str, remote: &'a str },
    Quit,
    Run(&'a str),
}

fn parse_line(line: &str) -> Result<Directive<'_>> {
    let trimmed = line.trim();
    if !trimmed.starts_with(':') {
        return Ok(Directive::Run(line.trim_end_matches(['\r', '\n'])));
    }

    let mut parts = trimmed.split_whitespace();
    let directive = match (parts.next(), parts.next(), parts.next()) {
        (Some(":open"), None, _) => Directive::Open,
        (Some(":close-session"), None, _) => Directive::CloseSession,
        (Some(":reconnect"), None, _) => Directive::Reconnect,
        (Some(":quit"), None, _) => Directive::Quit,
        (Some(":upload"), Some(remote), Some(local)) => Directive::Upload { remote, local },
        (Some(":download"), Some(local), Some(remote)) => Directive::Download { local, remote },
        _ => bail!("unknown directive: {}", trimmed),
    };

    if parts.next().is_some() {
        bail!("too many arguments: {}", trimmed);
    }
    Ok(directive)
}

fn print_outcome(outcome: &CommandOutcome) {
    println!("{}", outcome);
}

fn print_error(e: &SshError) {
    if e.is_state_violation() {
        println!("{}", e);
    } else {
        println!("exception {:?} - {}", e.kind(), e);
    }
}

/// 执行一条指令，返回 false 表示退出
fn dispatch(manager: &mut ConnectionManager, directive: Directive<'_>) -> bool {
    match directive {
        Directive::Open => match manager.session_open() {
            Ok(Some(outcome)) => print_outcome(&outcome),
            Ok(None) => {}
            Err(e) => print_error(&e),
        },
        Directive::CloseSession => {
            if let Err(e) = manager.session_close() {
                print_error(&e);
            }
        }
        Directive::Reconnect => {
            if let Err(e) = manager.reconnect() {
                print_error(&e);
            }
        }
        Directive::Upload { remote, local } => {
            match manager.upload(remote, Path::new(local)) {
                Ok(report) => println!("uploaded {} bytes to {}", report.bytes, report.remote_path),
                Err(e) => print_error(&e),
            }
        }
        Directive::Download { local, remote } => {
            match manager.download(Path::new(local), remote) {
                Ok(report) => println!("downloaded {} bytes to {}", report.bytes, report.local_path),
                Err(e) => print_error(&e),
            }
        }
        Directive::Quit => return false,
        Directive::Run(command) if command.trim().is_empty() => {}
        Directive::Run(command) => {
            let result = if manager.is_session_open() {
                manager.session_command(command)
            } else {
                manager.command(command)
            };
            match result {
                Ok(outcome) => print_outcome(&outcome),
                Err(e) => print_error(&e),
            }
        }
    }
    true
}

fn main() -> Result<()> {
    let config_path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => bail!("usage: sshmanager <config.json>"),
    };

    // 日志初始化失败不影响运行
    if let Err(e) = logging::init(&LogConfig::default()) {
        eprintln!("failed to open log file: {}", e);
    }

    let config = SshConfig::load(&config_path)
        .with_context(|| format!("failed to load config {:?}", config_path))?;
    let mut manager = ConnectionManager::new(config).context("failed to start ssh runtime")?;

    if let Some(failure) = manager.connect_error() {
        println!("exception {:?} - {}", failure.kind, failure.message);
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        let keep_going = match parse_line(&line) {
            Ok(directive) => dispatch(&mut manager, directive),
            Err(e) => {
                println!("{}", e);
                true
            }
        };
        io::stdout().flush()?;
        if !keep_going {
            break;
        }
    }

    if manager.close() {
        println!("ssh client closed.");
    }
    Ok(())
}
