use anyhow::{bail, Context, Result};
use asset_manager::bank_format::{read_index, read_payload_record};
use asset_manager::{BankWriter, Compressor, Deflate, PcmFormat};
use clap::{Parser, Subcommand};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

// Sound bank packer.
//   asset-packer pack sounds/ out.bank [--compress]
//   asset-packer inspect out.bank

#[derive(Parser)]
#[command(about = "Build and inspect sound banks")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack every 8/16-bit PCM WAV file under a directory into one bank
    Pack {
        /// Directory scanned recursively for .wav files
        input: PathBuf,
        /// Bank file to write
        output: PathBuf,
        /// DEFLATE each payload; load with the Deflate codec
        #[arg(long)]
        compress: bool,
    },
    /// Print the index of a bank
    Inspect {
        bank: PathBuf,
    },
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    match args.command {
        Command::Pack {
            input,
            output,
            compress,
        } => {
            let count = pack_directory(&input, &output, compress)?;
            println!("wrote {} sound(s) to {}", count, output.display());
        }
        Command::Inspect { bank } => {
            for line in inspect(&bank)? {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

fn collect_wavs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            p.extension()
                .and_then(|x| x.to_str())
                .is_some_and(|x| x.eq_ignore_ascii_case("wav"))
        })
        .collect();
    // stable output regardless of directory iteration order
    files.sort();
    files
}

/// Bank name for a file: its path below `root`, without extension, `/`-separated.
fn sound_name(root: &Path, file: &Path) -> String {
    let rel = file.strip_prefix(root).unwrap_or(file).with_extension("");
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Read a WAV file into raw bank PCM: unsigned 8-bit or signed 16-bit LE.
fn read_wav(path: &Path) -> Result<(PcmFormat, Vec<u8>)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        bail!("{}: float samples are not supported", path.display());
    }
    let format = PcmFormat::new(spec.channels, spec.bits_per_sample, spec.sample_rate);
    format
        .validate()
        .with_context(|| format!("{}: unsupported format", path.display()))?;

    let pcm = match spec.bits_per_sample {
        8 => reader
            .samples::<i8>()
            .map(|s| s.map(|v| (v as i16 + 128) as u8))
            .collect::<Result<Vec<u8>, _>>()?,
        _ => {
            let mut out = Vec::with_capacity(reader.len() as usize * 2);
            for s in reader.samples::<i16>() {
                out.extend_from_slice(&s?.to_le_bytes());
            }
            out
        }
    };
    Ok((format, pcm))
}

fn pack_directory(input: &Path, output: &Path, compress: bool) -> Result<usize> {
    let files = collect_wavs(input);
    if files.is_empty() {
        bail!("no .wav files under {}", input.display());
    }
    if compress {
        pack_files(input, &files, output, BankWriter::with_compressor(Deflate::default()))
    } else {
        pack_files(input, &files, output, BankWriter::new())
    }
}

fn pack_files<C: Compressor>(
    input: &Path,
    files: &[PathBuf],
    output: &Path,
    mut writer: BankWriter<C>,
) -> Result<usize> {
    // sounds are keyed by file stem inside a bank
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    for file in files {
        let name = sound_name(input, file);
        let stem = asset_manager::handle::normalize_sound_name(&name).to_string();
        if let Some(prev) = seen.insert(stem.clone(), file.clone()) {
            warn!(
                file = %file.display(),
                shadowed = %prev.display(),
                name = %stem,
                "duplicate sound name; the later file wins at lookup"
            );
        }
        let (format, pcm) = read_wav(file)?;
        info!(
            %name,
            channels = format.channels,
            bits = format.bits_per_sample,
            rate = format.sample_rate,
            bytes = pcm.len(),
            "packed"
        );
        writer.add_sound(name, format, pcm);
    }
    writer
        .write_to_path(output)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(writer.len())
}

fn inspect(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let entries = read_index(&mut reader, file_len).context("reading index")?;

    let mut lines = vec![format!(
        "{}: {} sound(s), {} bytes",
        path.display(),
        entries.len(),
        file_len
    )];
    for e in &entries {
        let d = e.descriptor;
        let record = read_payload_record(&mut reader, &d, file_len)
            .with_context(|| format!("reading payload of '{}'", e.name))?;
        let digest = Sha256::digest(&record);
        lines.push(format!(
            "{:<24} {} {}ch {:>2}bit {:>6}Hz offset={} size={} sha256={:x}",
            e.name, e.handle, d.channels, d.bits_per_sample, d.sample_rate, d.data_offset,
            record.len(),
            digest
        ));
    }
    Ok(lines)
}
