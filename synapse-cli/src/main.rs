//! Synapse CLI - コマンドラインインターフェース
//!
//! エミュレートされたマシンをデバッグハーネスの下で動かすサーバーと、
//! 独自プロトコルで話すREPLクライアント

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::thread;
use synapse_core::parse::parse_address;
use synapse_core::{Command, DebuggerConfig};
use synapse_net::{DuplexClient, Harness, HarnessConfig, NetConfig};
use synapse_proto::{MachineState, Message};
use synapse_target::RamMachine;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 履歴ファイル名（ホームディレクトリ直下）
const HISTORY_FILE: &str = ".synapse_history";

/// Synapse - Remote debugger for an emulated ARM machine
#[derive(Parser)]
#[command(name = "synapse")]
#[command(version = "0.1.0")]
#[command(about = "Remote debugging harness for a stepped CPU emulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run a machine under the debugging harness
    Serve {
        /// Port for the private protocol
        #[arg(short, long, default_value_t = 4141)]
        port: u16,

        /// Port for GDB remote connections
        #[arg(short, long)]
        gdb_port: Option<u16>,

        /// Size of the machine memory in bytes
        #[arg(short, long, value_parser = parse_address, default_value = "0x400000")]
        memory_size: u32,

        /// Memory image loaded at address 0
        #[arg(short, long)]
        image: Option<PathBuf>,

        /// Directory whose files make up the tape catalog
        #[arg(short, long)]
        tape_dir: Option<PathBuf>,

        /// Cycles executed per slice while running
        #[arg(long, value_parser = parse_address)]
        frame_cycles: Option<u32>,

        /// Address of the symbol table in machine memory
        #[arg(long, value_parser = parse_address)]
        symbols_addr: Option<u32>,
    },

    /// Connect to a running harness
    Client {
        /// Host of the harness
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port of the harness
        #[arg(short, long, default_value_t = 4141)]
        port: u16,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Mode::Serve {
            port,
            gdb_port,
            memory_size,
            image,
            tape_dir,
            frame_cycles,
            symbols_addr,
        } => {
            let mut debugger = DebuggerConfig::default();
            if let Some(cycles) = frame_cycles {
                debugger.frame_cycles = cycles;
            }
            if let Some(addr) = symbols_addr {
                debugger.symbols_addr = addr;
            }
            let config = HarnessConfig {
                private_addr: format!("0.0.0.0:{}", port),
                gdb_addr: gdb_port.map(|port| format!("0.0.0.0:{}", port)),
                debugger,
                net: NetConfig::default(),
                tapes: match tape_dir {
                    Some(dir) => list_tapes(&dir)?,
                    None => Vec::new(),
                },
            };
            serve(memory_size as usize, image.as_deref(), config)
        }
        Mode::Client { host, port } => {
            println!("Synapse - Remote Debugger");
            println!("Version 0.1.0");
            println!();
            run_client(&host, port)
        }
    }
}

/// マシンを作ってハーネスを起動し、終了まで待つ
fn serve(memory_size: usize, image: Option<&Path>, config: HarnessConfig) -> Result<()> {
    let machine = match image {
        Some(path) => {
            let bytes = std::fs::read(path).with_context(|| format!("Failed to read image {}", path.display()))?;
            info!("loaded {} bytes from {}", bytes.len(), path.display());
            RamMachine::with_image(memory_size, &bytes)
        }
        None => RamMachine::new(memory_size),
    };

    let mut harness = Harness::start(machine, config)?;
    println!("Private protocol listening on {}", harness.private_addr());
    if let Some(addr) = harness.gdb_addr() {
        println!("GDB remote listening on {}", addr);
    }
    harness.wait();
    Ok(())
}

/// テープディレクトリのファイル名を名前順に並べる
fn list_tapes(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("Failed to read tape dir {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// REPLループを実行する
fn run_client(host: &str, port: u16) -> Result<()> {
    let server = format!("{}:{}", host, port);
    let (client, messages) = DuplexClient::start(&server, "127.0.0.1", NetConfig::default())?;
    println!("Connecting to {} (replies on {})", server, client.listen_addr());
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    thread::Builder::new()
        .name("printer".into())
        .spawn(move || print_messages(messages))?;

    let mut rl = DefaultEditor::new()?;
    let history = home::home_dir().map(|dir| dir.join(HISTORY_FILE));
    if let Some(path) = &history {
        // 初回は履歴ファイルがない
        let _ = rl.load_history(path);
    }

    loop {
        let readline = rl.readline("(synapse) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match Command::parse(line) {
                    Some(Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Some(Command::Help) => print_help(),
                    Some(command) => {
                        if let Some(message) = command.to_message() {
                            if let Err(e) = client.send(&message) {
                                eprintln!("Error: {}", e);
                            }
                        }
                    }
                    None => {
                        println!("Unknown command: {}", line);
                        println!("Type 'help' for available commands.");
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(e) = rl.save_history(path) {
            eprintln!("Failed to save history: {}", e);
        }
    }
    let _ = client.send(&Message::Disconnect);
    Ok(())
}

/// サーバーからのメッセージを表示し続ける
fn print_messages(messages: Receiver<Message>) {
    for message in messages {
        match message {
            Message::Stop => println!("\nStopped"),
            Message::State(state) => print_state(&state),
            Message::MemData(data) => {
                println!("Watch {} @ 0x{:08x}:", data.id, data.start);
                print_hexdump(data.start, &data.data);
            }
            Message::DisassemblyData(data) => {
                for line in &data.lines {
                    println!("{}", line);
                }
            }
            Message::TapeList(list) => {
                println!("Tapes ({} total):", list.total);
                for (i, name) in list.names.iter().enumerate() {
                    println!("  {}. {}", list.start as usize + i, name);
                }
            }
            Message::SymbolData(symbols) => {
                if symbols.is_empty() {
                    println!("No symbols found");
                }
                for (addr, name) in &symbols {
                    println!("  0x{:08x} {}", addr, name);
                }
            }
            other => println!("Received {:?}", other.message_type()),
        }
    }
}

fn print_state(state: &MachineState) {
    println!();
    for (row, regs) in state.registers.chunks(4).enumerate() {
        let line: Vec<String> = regs
            .iter()
            .enumerate()
            .map(|(i, value)| format!("r{:<2} {:08x}", row * 4 + i, value))
            .collect();
        println!("  {}", line.join("  "));
    }
    println!(
        "  pc  {:08x}  mode {:x}{}",
        state.pc,
        state.mode,
        if state.waiting { "  (waiting for interrupt)" } else { "" }
    );
}

fn print_hexdump(start: u32, data: &[u8]) {
    for (i, chunk) in data.chunks(16).enumerate() {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        println!("  {:08x}: {}", start as usize + i * 16, bytes.join(" "));
    }
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help           - Show this help message");
    println!("  quit/exit/q    - Exit the client");
    println!();
    println!("Execution:");
    println!("  continue (c)   - Continue execution");
    println!("  stop           - Stop execution");
    println!("  step (s)       - Execute one instruction");
    println!("  next (n)       - Step over a call");
    println!("  restart        - Restart the machine");
    println!();
    println!("Breakpoints and memory:");
    println!("  break <addr>   - Set breakpoint at address");
    println!("  delete <addr>  - Remove breakpoint at address");
    println!("  watch <id> <addr> [size] - Watch a memory region");
    println!("  unwatch <id>   - Remove a memory watch");
    println!("  disas <addr> [size] - Disassemble memory");
    println!("  symbols        - List symbols");
    println!();
    println!("Tapes:");
    println!("  tapes [start] [count] - List tapes");
    println!("  load <index>   - Load a tape");
    println!("  unload         - Unload the current tape");
    println!();
    println!("Examples:");
    println!("  break 0x8000");
    println!("  watch 1 0x1000 64");
    println!("  disas 0x8000");
}
