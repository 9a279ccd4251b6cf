use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use dif_core::descriptor::{Envelope, FileEntry, Layout};
use dif_core::path_safety::PathPolicy;
use dif_core::progress::Progress;
use dif_core::verify::{verify, VerifyOptions};
use dif_core::{BuildOptions, DescriptorBuilder, Fingerprint, DEFAULT_PIECE_LENGTH};

#[derive(Parser)]
#[command(name = "dif", version, about = "Data Integrity Fingerprints for files and directory trees")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Compute the fingerprint of a file or directory
    Create {
        path: PathBuf,
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: usize,
        /// Write the descriptor to <name>.torrent in the current directory
        #[arg(long, default_value_t = false)]
        write: bool,
        /// Write the descriptor to this path (implies --write)
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, default_value = "")]
        announce: String,
        /// One tier of announce URLs, comma separated; repeat for more tiers
        #[arg(long = "announce-list")]
        announce_list: Vec<String>,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long = "http-seed")]
        http_seeds: Vec<String>,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[arg(long, default_value_t = false)]
        progress: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check a file or directory against a fingerprint
    Verify {
        path: PathBuf,
        fingerprint: String,
        /// Descriptor written by `create`; enables per-file corruption reports
        #[arg(long)]
        descriptor: Option<PathBuf>,
        /// Used only without --descriptor
        #[arg(long, default_value_t = DEFAULT_PIECE_LENGTH)]
        piece_length: usize,
        #[arg(long, default_value_t = false)]
        follow_symlinks: bool,
        #[arg(long, default_value_t = false)]
        parallel: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the contents of a descriptor
    Show {
        descriptor: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<ExitCode> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Create {
            path,
            piece_length,
            write,
            output,
            announce,
            announce_list,
            comment,
            http_seeds,
            parallel,
            progress,
            json,
        } => {
            let opts = BuildOptions {
                piece_length,
                announce,
                announce_list: parse_tiers(&announce_list),
                comment,
                http_seeds: (!http_seeds.is_empty()).then_some(http_seeds),
                parallel,
            };
            let target = match (write, output) {
                (_, Some(p)) => Some(Some(p)),
                (true, None) => Some(None),
                (false, None) => None,
            };
            create(&path, opts, target, progress, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Cmd::Verify { path, fingerprint, descriptor, piece_length, follow_symlinks, parallel, json } => {
            let opts = VerifyOptions {
                build: BuildOptions { piece_length, parallel, ..BuildOptions::default() },
                policy: PathPolicy { follow_symlinks },
            };
            let ok = verify_cmd(&path, &fingerprint, descriptor.as_deref(), &opts, json)?;
            Ok(if ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Cmd::Show { descriptor, json } => {
            show(&descriptor, json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// `--announce-list "a,b" --announce-list "c"` -> `[[a, b], [c]]`
fn parse_tiers(raw: &[String]) -> Option<Vec<Vec<String>>> {
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.iter()
            .map(|tier| {
                tier.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
            })
            .collect(),
    )
}

#[derive(Serialize)]
struct CreateOutput<'a> {
    fingerprint: Fingerprint,
    name: &'a str,
    piece_length: u64,
    pieces: usize,
    total_length: u64,
    descriptor: Option<PathBuf>,
}

fn create(
    path: &Path,
    opts: BuildOptions,
    descriptor: Option<Option<PathBuf>>,
    show_progress: bool,
    json: bool,
) -> Result<()> {
    let prog = Progress::new(show_progress);
    let built = DescriptorBuilder::new(opts)
        .with_progress(prog)
        .build(path)
        .with_context(|| format!("fingerprint {}", path.display()))?;

    let written = match descriptor {
        Some(target) => {
            let p = built.write(target.as_deref()).context("write descriptor")?;
            eprintln!("Wrote descriptor {}", p.display());
            Some(p)
        }
        None => None,
    };

    if json {
        let info = &built.envelope.info;
        let out = CreateOutput {
            fingerprint: built.fingerprint,
            name: &info.name,
            piece_length: info.piece_length,
            pieces: info.pieces.len(),
            total_length: info.total_length(),
            descriptor: written,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{}", built.fingerprint);
    }
    Ok(())
}

fn verify_cmd(
    path: &Path,
    fingerprint: &str,
    descriptor: Option<&Path>,
    opts: &VerifyOptions,
    json: bool,
) -> Result<bool> {
    let expected: Fingerprint = fingerprint.parse()?;
    let report = verify(path, &expected, descriptor, opts)
        .with_context(|| format!("verify {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.fingerprint_ok);
    }
    for c in report.corrupted() {
        eprintln!("{} seems to be corrupted!", c.display());
    }
    if let Some(check) = &report.pieces {
        eprintln!(
            "Pieces ok={}, bad={}, expected={}, found={}",
            check.pieces_ok, check.pieces_bad, check.pieces_expected, check.pieces_found
        );
    }
    if report.descriptor_ok == Some(false) {
        eprintln!("Warning: descriptor does not carry fingerprint {}", expected);
    }
    eprintln!("Fingerprint {} (expected {})", report.computed, report.expected);
    println!("{}", if report.fingerprint_ok { "OK" } else { "BAD" });
    Ok(report.fingerprint_ok)
}

#[derive(Serialize)]
struct ShowOutput<'a> {
    fingerprint: Fingerprint,
    name: &'a str,
    piece_length: u64,
    pieces: usize,
    total_length: u64,
    announce: &'a str,
    announce_list: &'a Option<Vec<Vec<String>>>,
    creation_date: i64,
    comment: &'a Option<String>,
    http_seeds: &'a Option<Vec<String>>,
    layout: &'a Layout,
}

fn show(descriptor: &Path, json: bool) -> Result<()> {
    let env = Envelope::read(descriptor).with_context(|| format!("read {}", descriptor.display()))?;
    let info = &env.info;
    if json {
        let out = ShowOutput {
            fingerprint: env.fingerprint(),
            name: &info.name,
            piece_length: info.piece_length,
            pieces: info.pieces.len(),
            total_length: info.total_length(),
            announce: &env.announce,
            announce_list: &env.announce_list,
            creation_date: env.creation_date,
            comment: &env.comment,
            http_seeds: &env.http_seeds,
            layout: &info.layout,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Name:          {}", info.name);
    println!("Fingerprint:   {}", env.fingerprint());
    println!("Piece length:  {}", info.piece_length);
    println!("Pieces:        {}", info.pieces.len());
    println!("Total length:  {}", info.total_length());
    println!("Created:       {}", env.creation_date);
    if !env.announce.is_empty() {
        println!("Announce:      {}", env.announce);
    }
    if let Some(c) = &env.comment {
        println!("Comment:       {}", c);
    }
    match &info.layout {
        Layout::Single { md5sum, .. } => {
            if let Some(m) = md5sum {
                println!("MD5:           {}", m);
            }
        }
        Layout::Multi { files } => {
            println!("Files:         {}", files.len());
            for FileEntry { path, length, .. } in files {
                println!("  {:>12}  {}", length, path.join("/"));
            }
        }
    }
    if let Some(first) = info.pieces.first() {
        println!("First piece:   {}", hex::encode(first));
    }
    Ok(())
}
