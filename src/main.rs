
//! The `tilebc` command line tool.
//!
//! Converts each input file to its counterpart format, detected from
//! the file signature: TIS becomes TBC and back, MOS or MOSC becomes
//! MBC and back, TIZ and MOZ are decoded to TIS and MOS.

use std::io::Write;
use std::path::PathBuf;

use argh::FromArgs;

use tilebc::codec::Encoding;
use tilebc::convert::{self, Options};
use tilebc::error::Result;


#[derive(FromArgs)]
/// Convert Infinity Engine TIS/MOS tile graphics to the
/// block compressed TBC/MBC formats and back.
struct Args {

    /// pixel encoding for TBC/MBC output: raw, bc1, bc2 or bc3 (default bc1)
    #[argh(option, short = 't', from_str_fn(parse_encoding), default = "Encoding::Bc1")]
    encoding: Encoding,

    /// do not wrap encoded tiles in zlib streams
    #[argh(switch, short = 'u')]
    uncompressed: bool,

    /// block compression effort from 0 (fast) to 9 (thorough), default 9
    #[argh(option, short = 'e', default = "9")]
    encode_quality: u8,

    /// color reduction effort from 0 (fast) to 9 (thorough), default 4
    #[argh(option, short = 'd', default = "4")]
    decode_quality: u8,

    /// worker threads, 0 autodetects (default)
    #[argh(option, short = 'j', default = "0")]
    threads: usize,

    /// output file name, only allowed with a single input file
    #[argh(option, short = 'o')]
    output: Option<PathBuf>,

    /// write MOSC instead of plain MOS output
    #[argh(switch)]
    mosc: bool,

    /// treat unrecognized input as headerless TIS files
    #[argh(switch)]
    assume_tis: bool,

    /// stop at the first file that fails instead of continuing the batch
    #[argh(switch)]
    halt_on_error: bool,

    /// print nothing but errors
    #[argh(switch, short = 's')]
    silent: bool,

    /// the files to convert
    #[argh(positional)]
    files: Vec<PathBuf>,
}

fn parse_encoding(value: &str) -> std::result::Result<Encoding, String> {
    match value.to_ascii_lowercase().as_str() {
        "raw" | "0" => Ok(Encoding::Raw),
        "bc1" | "dxt1" | "1" => Ok(Encoding::Bc1),
        "bc2" | "dxt3" | "2" => Ok(Encoding::Bc2),
        "bc3" | "dxt5" | "3" => Ok(Encoding::Bc3),
        _ => Err(format!("unknown encoding \"{}\", expected raw, bc1, bc2 or bc3", value)),
    }
}

fn main() {
    let args: Args = argh::from_env();
    std::process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    if args.files.is_empty() {
        eprintln!("no input files");
        return 1;
    }

    if args.output.is_some() && args.files.len() > 1 {
        eprintln!("--output cannot be combined with multiple input files");
        return 1;
    }

    let options = Options {
        encoding: args.encoding,
        deflate: !args.uncompressed,
        encode_quality: args.encode_quality.min(9),
        decode_quality: args.decode_quality.min(9),
        threads: args.threads,
        assume_tis: args.assume_tis,
        mosc: args.mosc,
    };

    let mut failures = 0;

    for file in &args.files {
        if let Err(error) = convert_one(file, args, &options) {
            eprintln!("{}: {}", file.display(), error);
            failures += 1;
            if args.halt_on_error { break; }
        }
    }

    if failures == 0 { 0 } else { 1 }
}

fn convert_one(file: &PathBuf, args: &Args, options: &Options) -> Result<()> {
    let bytes = std::fs::read(file)?;

    if !args.silent {
        print!("converting {} ", file.display());
        let _ = std::io::stdout().flush();
    }

    // one dot per twentieth of the tiles
    let mut dots = 0;
    let progress = |progress: f64| {
        if args.silent { return; }

        while dots < (progress * 20.0) as usize {
            print!(".");
            dots += 1;
        }

        let _ = std::io::stdout().flush();
    };

    let converted = convert::convert_file(&bytes, options, progress)?;

    let target = match &args.output {
        Some(output) => output.clone(),
        None => file.with_extension(converted.extension),
    };

    std::fs::write(&target, &converted.output)?;

    if !args.silent {
        println!(
            " {} ({} -> {} bytes, {:.1}%)",
            target.display(), bytes.len(), converted.output.len(),
            converted.output.len() as f64 * 100.0 / bytes.len().max(1) as f64
        );
    }

    Ok(())
}
