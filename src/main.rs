use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use engine::checkpoint::Checkpoint;
use engine::error::{EngineError, Result};
use engine::gpu::device::GpuContext;
use engine::gpu::pipeline::PipelineManager;
use engine::gpu::BufferPool;
use engine::model::weights::Weights;
use engine::model::Transformer;
use engine::rng::Rng;
use engine::sampling::{sample_greedy, sample_multinomial, sample_top_p};
use engine::tokenizer::{Tokenizer, BOS_TOKEN};

struct Args {
    checkpoint: PathBuf,
    temperature: f32,
    topp: f32,
    seed: u64,
    steps: usize,
    prompt: String,
}

fn usage() -> &'static str {
    "usage: run <checkpoint> [-t <float>] [-p <float>] [-s <int>] [-n <int>] [-i <prompt>]"
}

fn default_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(1)
}

fn parse_args(raw: &[String]) -> Result<Args> {
    let Some((checkpoint, rest)) = raw.split_first() else {
        return Err(EngineError::Usage(usage().into()));
    };

    let mut args = Args {
        checkpoint: PathBuf::from(checkpoint),
        temperature: 1.0,
        topp: 0.9,
        seed: default_seed(),
        steps: 256,
        prompt: String::new(),
    };

    let mut i = 0;
    while i < rest.len() {
        let flag = &rest[i];
        if flag.len() != 2 || !flag.starts_with('-') {
            return Err(EngineError::Usage(format!("{}\nmalformed flag: {flag}", usage())));
        }
        let Some(value) = rest.get(i + 1) else {
            return Err(EngineError::Usage(format!("{}\nmissing value for {flag}", usage())));
        };

        match flag.as_str() {
            "-t" => {
                args.temperature = value
                    .parse()
                    .map_err(|_| EngineError::Usage(format!("{}\ninvalid -t value: {value}", usage())))?
            }
            "-p" => {
                args.topp = value
                    .parse()
                    .map_err(|_| EngineError::Usage(format!("{}\ninvalid -p value: {value}", usage())))?
            }
            "-s" => {
                args.seed = value
                    .parse()
                    .map_err(|_| EngineError::Usage(format!("{}\ninvalid -s value: {value}", usage())))?
            }
            "-n" => {
                args.steps = value
                    .parse()
                    .map_err(|_| EngineError::Usage(format!("{}\ninvalid -n value: {value}", usage())))?
            }
            "-i" => args.prompt = value.clone(),
            other => return Err(EngineError::Usage(format!("{}\nunknown flag: {other}", usage()))),
        }
        i += 2;
    }

    if args.seed == 0 {
        return Err(EngineError::Usage("seed 0 is rejected: xorshift* cannot produce a nonzero state from it".into()));
    }

    Ok(args)
}

fn run(args: Args) -> Result<()> {
    let ckpt = Checkpoint::open(&args.checkpoint)?;
    let steps = args.steps.min(ckpt.config.seq_len);
    if steps != args.steps {
        tracing::info!(requested = args.steps, clamped_to = steps, "step count clamped to seq_len");
    }

    let tokenizer_path = args
        .checkpoint
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("tokenizer.bin");
    let tokenizer_file = std::fs::File::open(&tokenizer_path)?;
    let tokenizer = Tokenizer::read_from(tokenizer_file, ckpt.config.vocab_size)?;

    let ctx = pollster::block_on(GpuContext::init())?;
    let pool = BufferPool::new(&ctx);
    let mut pm = PipelineManager::new(ctx.device.clone());

    let weights = Weights::load(&ckpt, &ctx.queue, &pool)?;
    let mut transformer = Transformer::new(ckpt.config, weights, &pool);

    let prompt_tokens = tokenizer.encode(&args.prompt)?;
    let mut rng = Rng::new(args.seed);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut token = BOS_TOKEN;
    let mut pos = 0usize;
    let mut start: Option<Instant> = None;

    while pos < steps {
        transformer.step(&ctx, &mut pm, &pool, &ckpt, token, pos as u32);

        let next = if pos < prompt_tokens.len() {
            prompt_tokens[pos]
        } else if transformer.config.vocab_size == 0 {
            return Err(EngineError::Checkpoint("empty vocabulary".into()));
        } else if args.temperature == 0.0 {
            sample_greedy(&ctx, &mut pm, &pool, &transformer.state.logits, transformer.config.vocab_size as u32)?
        } else if args.topp <= 0.0 {
            sample_multinomial(
                &ctx,
                &mut pm,
                &pool,
                &transformer.state.logits,
                transformer.config.vocab_size as u32,
                args.temperature,
                &mut rng,
            )?
        } else {
            sample_top_p(
                &ctx,
                &mut pm,
                &pool,
                &transformer.state.logits,
                transformer.config.vocab_size as u32,
                args.temperature,
                args.topp,
                &mut rng,
            )?
        };

        pos += 1;
        if next == BOS_TOKEN {
            break;
        }

        let piece = tokenizer.decode(token, next);
        out.write_all(piece)?;
        token = next;

        if start.is_none() {
            start = Some(Instant::now());
        }
    }

    out.write_all(b"\n")?;
    out.flush()?;

    if pos > 1 {
        if let Some(start) = start {
            let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
            let tok_per_s = (pos as f64 - 1.0) * 1000.0 / elapsed_ms;
            eprintln!("achieved tok/s: {tok_per_s}");
        }
    }

    tracing::debug!(steps_run = pos, "generation finished");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "engine=info".into()))
        .with_writer(io::stderr)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
