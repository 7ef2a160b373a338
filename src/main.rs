use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use image::ExtendedColorType;
use qoi::{Channels, Colorspace, Header};
use rayon::prelude::*;

#[derive(Parser)]
#[command(name = "qoi", about = "Encode, decode and inspect QOI images")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode images of any format `image` understands into `.qoi` files
    Encode {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory for the output files (defaults to each input's directory)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,
        /// Tag the output as linear instead of sRGB
        #[arg(long)]
        linear: bool,
    },
    /// Decode `.qoi` files into `.png` files
    Decode {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory for the output files (defaults to each input's directory)
        #[arg(long, short)]
        output_dir: Option<PathBuf>,
    },
    /// Decode a `.qoi` file, re-encode it into `roundtripped.qoi` and time both
    Roundtrip { input: PathBuf },
    /// Print the header of a `.qoi` file
    Info { input: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match Args::parse().command {
        Command::Encode {
            inputs,
            output_dir,
            linear,
        } => {
            let colorspace = if linear {
                Colorspace::Linear
            } else {
                Colorspace::Srgb
            };
            for_each_input(&inputs, |input| {
                let output = output_path(input, output_dir.as_deref(), "qoi");
                encode_file(input, &output, colorspace)
            })
        }
        Command::Decode { inputs, output_dir } => for_each_input(&inputs, |input| {
            let output = output_path(input, output_dir.as_deref(), "png");
            decode_file(input, &output)
        }),
        Command::Roundtrip { input } => roundtrip(&input),
        Command::Info { input } => info(&input),
    }
}

/// Images are independent, so each one gets its own codec call on the
/// rayon pool. Every failure is logged before the first one is returned.
fn for_each_input(
    inputs: &[PathBuf],
    f: impl Fn(&Path) -> Result<()> + Sync,
) -> Result<()> {
    let failures: Vec<_> = inputs
        .par_iter()
        .filter_map(|input| f(input.as_path()).err())
        .collect();
    for e in &failures {
        log::error!("{e:#}");
    }
    match failures.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> PathBuf {
    let file_name = input.with_extension(extension);
    match (output_dir, file_name.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => file_name,
    }
}

fn create_file(path: &Path) -> io::Result<BufWriter<File>> {
    let file = File::options()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(BufWriter::new(file))
}

fn encode_file(input: &Path, output: &Path, colorspace: Colorspace) -> Result<()> {
    let image = image::open(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    let (channels, data) = if image.color().has_alpha() {
        (Channels::Rgba, image.to_rgba8().into_raw())
    } else {
        (Channels::Rgb, image.to_rgb8().into_raw())
    };
    let header = Header {
        width: image.width(),
        height: image.height(),
        channels,
        colorspace,
    };
    let mut writer = create_file(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let written = qoi::encode(header, qoi::raw_pixels(channels, &data), &mut writer)
        .with_context(|| format!("failed to encode {}", input.display()))?;
    log::info!(
        "{} -> {} ({} bytes, {:.1}% of raw)",
        input.display(),
        output.display(),
        written,
        100.0 * written as f64 / data.len().max(1) as f64
    );
    Ok(())
}

fn decode_file(input: &Path, output: &Path) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let mut data = Vec::new();
    let header = qoi::decode(&mut BufReader::new(file), &mut data)
        .with_context(|| format!("failed to decode {}", input.display()))?;
    let color = match header.channels {
        Channels::Rgb => ExtendedColorType::Rgb8,
        Channels::Rgba => ExtendedColorType::Rgba8,
    };
    image::save_buffer(output, &data, header.width, header.height, color)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("{} -> {}", input.display(), output.display());
    Ok(())
}

fn roundtrip(input: &Path) -> Result<()> {
    let file_data = std::fs::read(input)
        .with_context(|| format!("failed to read {}", input.display()))?;

    let before_decode = Instant::now();
    let (decoded_data, header) = qoi::decode_to_vec(&file_data)?;
    let after_decode = Instant::now();
    let encoded_data = qoi::encode_to_vec(header, &decoded_data)?;
    let after_encode = Instant::now();

    println!("decode time: {} seconds", (after_decode - before_decode).as_secs_f64());
    println!("encode time: {} seconds", (after_encode - after_decode).as_secs_f64());

    let mut writer = create_file(Path::new("roundtripped.qoi"))?;
    writer.write_all(&encoded_data)?;
    writer.flush()?;

    let (redecoded, _) = qoi::decode_to_vec(&encoded_data)?;
    if redecoded != decoded_data {
        bail!("re-encoded image does not decode to the original pixels");
    }
    if encoded_data == file_data {
        println!("re-encoded stream is byte-identical");
    } else {
        println!(
            "re-encoded stream differs from the input ({} vs {} bytes), pixels match",
            encoded_data.len(),
            file_data.len()
        );
    }
    Ok(())
}

fn info(input: &Path) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("failed to open {}", input.display()))?;
    let header = qoi::decode_header(&mut BufReader::new(file))?;
    println!("width:      {}", header.width);
    println!("height:     {}", header.height);
    println!("channels:   {} ({})", header.channels as u8, header.channels);
    println!("colorspace: {} ({})", header.colorspace as u8, header.colorspace);
    Ok(())
}
