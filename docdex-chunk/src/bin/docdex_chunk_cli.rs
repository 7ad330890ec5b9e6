use clap::Parser;
use docdex_chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, TokenChunker};
use std::fs;
use std::io::{self, Read};

/// Chunk a text file into token windows and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Window size in tokens.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Overlap between consecutive windows in tokens.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_OVERLAP)]
    overlap: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let text = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let chunker = TokenChunker::new(args.chunk_size, args.overlap)?;
    let windows = chunker.chunk(&text);

    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
