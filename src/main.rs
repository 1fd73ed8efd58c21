//! Interactive shell over the in-memory VFS.
//!
//! Reads one command per line, prints the current directory as the
//! prompt, and reports failures as a single line. Exit status is 0 on a
//! clean `exit`/`quit`/EOF and 1 on a fatal error.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use starfs::{NodeKind, Result, StreamMode, Vfs, VfsError};

/// Window size for stream-backed `cat` and `read`.
const STREAM_WINDOW: usize = 512;

#[derive(Parser, Debug)]
#[command(name = "starfs", version, about = "In-memory virtual file system shell")]
struct Args {
    /// Log filter, e.g. "starfs=debug" (RUST_LOG is honored too)
    #[arg(long)]
    log: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log.as_deref());

    let mut vfs = Vfs::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{} $ ", vfs.pwd());
        io::stdout().flush().context("failed to flush prompt")?;
        let Some(line) = lines.next() else { break };
        let line = line.context("failed to read command line")?;
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = tokens.split_first() else {
            continue;
        };
        if command == "exit" || command == "quit" {
            break;
        }
        if let Err(err) = run_command(&mut vfs, command, rest, &mut lines) {
            println!("error: {err}");
        }
    }
    Ok(())
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(spec) => EnvFilter::new(spec),
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_command(
    vfs: &mut Vfs,
    command: &str,
    args: &[&str],
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    match command {
        "pwd" => {
            if require(args, 0, "pwd", "") {
                println!("{}", vfs.pwd());
            }
        }
        "ls" => {
            if args.len() > 1 {
                usage("ls", "[path]");
            } else {
                let path = args.first().copied().unwrap_or("");
                for (name, kind) in vfs.list(path)? {
                    match kind {
                        NodeKind::Directory => println!("{name}/"),
                        NodeKind::File => println!("{name}"),
                    }
                }
            }
        }
        "tree" => {
            if require(args, 0, "tree", "") {
                print!("{}", vfs.render_tree());
            }
        }
        "cd" => {
            if require(args, 1, "cd", "<path>") {
                vfs.cd(args[0])?;
            }
        }
        "mkdir" => {
            if require(args, 1, "mkdir", "<path>") {
                vfs.mkdir(args[0])?;
            }
        }
        "touch" | "create" => {
            if require(args, 1, command, "<path>") {
                vfs.create_file(args[0])?;
            }
        }
        "rm" => {
            if require(args, 1, "rm", "<path>") {
                vfs.rm(args[0])?;
            }
        }
        "rename" => {
            if require(args, 2, "rename", "<path> <newName>") {
                vfs.rename(args[0], args[1])?;
            }
        }
        "mv" => {
            if require(args, 2, "mv", "<src> <dstDir>") {
                vfs.mv(args[0], args[1])?;
            }
        }
        "cp" => {
            if require(args, 2, "cp", "<src> <dst>") {
                vfs.cp(args[0], args[1])?;
            }
        }
        "find" => {
            if require(args, 1, "find", "<name>") {
                let nodes = vfs.find_nodes_by_name(args[0]);
                if nodes.is_empty() {
                    println!("not found");
                }
                for node in nodes {
                    println!("{}", Vfs::path_of(&node));
                }
            }
        }
        "cat" => {
            if require(args, 1, "cat", "<path>") {
                vfs.with_file_stream(args[0], StreamMode::ReadOnly, STREAM_WINDOW, |stream| {
                    while !stream.eof() {
                        println!("{}", stream.read_line()?);
                    }
                    Ok(())
                })?;
            }
        }
        "read" => {
            if args.is_empty() || args.len() > 3 {
                usage("read", "<path> [offset] [count]");
            } else {
                let offset = parse_number(args.get(1))?;
                let count = parse_number(args.get(2))?;
                read_hex(vfs, args[0], offset, count)?;
            }
        }
        "nano" => {
            if require(args, 1, "nano", "<path>") {
                nano(vfs, args[0], lines)?;
            }
        }
        "echo" => echo(vfs, args)?,
        "compress" => {
            if require(args, 1, "compress", "<path>") {
                vfs.compress(args[0])?;
            }
        }
        "decompress" => {
            if require(args, 1, "decompress", "<path>") {
                vfs.decompress(args[0])?;
            }
        }
        "savejson" => {
            if require(args, 1, "savejson", "<path>") {
                vfs.save_json(args[0])?;
            }
        }
        "help" => print_help(),
        _ => println!("unknown command (type 'help')"),
    }
    Ok(())
}

fn require(args: &[&str], want: usize, command: &str, usage_text: &str) -> bool {
    if args.len() == want {
        true
    } else {
        usage(command, usage_text);
        false
    }
}

fn usage(command: &str, usage_text: &str) {
    if usage_text.is_empty() {
        println!("usage: {command}");
    } else {
        println!("usage: {command} {usage_text}");
    }
}

fn parse_number(arg: Option<&&str>) -> Result<Option<usize>> {
    match arg {
        None => Ok(None),
        Some(text) => text
            .parse::<usize>()
            .map(Some)
            .map_err(|_| VfsError::InvalidArg(format!("not a number: {text}"))),
    }
}

fn read_hex(vfs: &Vfs, path: &str, offset: Option<usize>, count: Option<usize>) -> Result<()> {
    vfs.with_file_stream(path, StreamMode::ReadOnly, STREAM_WINDOW, |stream| {
        if let Some(offset) = offset {
            stream.seek(offset)?;
        }
        let mut remaining = count;
        let mut chunk = [0u8; 16];
        loop {
            let want = match remaining {
                Some(0) => break,
                Some(n) => n.min(chunk.len()),
                None => chunk.len(),
            };
            let got = stream.read(&mut chunk[..want])?;
            if got == 0 {
                break;
            }
            for byte in &chunk[..got] {
                print!("0x{byte:02X} ");
            }
            if let Some(n) = remaining {
                remaining = Some(n - got);
            }
        }
        println!();
        Ok(())
    })
}

fn nano(
    vfs: &mut Vfs,
    path: &str,
    lines: &mut impl Iterator<Item = io::Result<String>>,
) -> Result<()> {
    ensure_file(vfs, path)?;
    println!("Enter text. End with a single '.' on a line.");
    let mut text = String::new();
    for line in lines {
        let line = line?;
        if line == "." {
            break;
        }
        text.push_str(&line);
        text.push('\n');
    }
    vfs.write_file(path, &text, false)
}

fn echo(vfs: &mut Vfs, args: &[&str]) -> Result<()> {
    if args.len() < 2 {
        usage("echo", "<text...> > <path>  |  echo <text...> >> <path>");
        return Ok(());
    }
    let redirect = args[args.len() - 2];
    let append = match redirect {
        ">" => false,
        ">>" => true,
        _ => {
            usage("echo", "<text...> > <path>  |  echo <text...> >> <path>");
            return Ok(());
        }
    };
    let path = args[args.len() - 1];
    let text = args[..args.len() - 2].join(" ");
    ensure_file(vfs, path)?;
    vfs.write_file(path, &format!("{text}\n"), append)
}

fn ensure_file(vfs: &mut Vfs, path: &str) -> Result<()> {
    match vfs.read_file(path) {
        Ok(_) => Ok(()),
        Err(VfsError::Path(_)) => vfs.create_file(path).map(|_| ()),
        Err(err) => Err(err),
    }
}

fn print_help() {
    println!(
        "\
Commands:
  pwd
  ls [path]
  tree
  cd <path>
  mkdir <path>
  touch <path>        (also: create)
  rm <path>
  mv <src> <dstDir>
  cp <src> <dst>
  rename <path> <newName>
  find <name>
  cat <path>
  nano <path>         (read lines until a single '.')
  echo <text...> > <path>
  echo <text...> >> <path>
  read <path> [offset] [count]
  compress <path>
  decompress <path>
  savejson <path>
  help
  exit | quit"
    );
}
