use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use domcat::{DomainLayout, DomainLevel, Domains, Mesh};

#[derive(Parser, Debug)]
#[command(version, about = "Domain-aware concatenation layout inspector", long_about = None)]
struct Args {
    /// JSON mesh file, e.g. {"separator": {"npts": 3}}
    #[arg(short, long)]
    mesh: String,

    /// Primary domains of one child, comma separated; repeat per child
    #[arg(short, long, required = true)]
    child: Vec<String>,

    /// Secondary domains shared by all children
    #[arg(long, value_delimiter = ',')]
    secondary: Vec<String>,

    /// Tertiary domains shared by all children
    #[arg(long, value_delimiter = ',')]
    tertiary: Vec<String>,

    /// Quaternary domains shared by all children
    #[arg(long, value_delimiter = ',')]
    quaternary: Vec<String>,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

fn split_domains(arg: &str) -> Vec<String> {
    arg.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn main() -> Result<()> {
    domcat::init_logger();
    let args = Args::parse();

    let text = std::fs::read_to_string(&args.mesh)
        .with_context(|| format!("failed to read mesh file '{}'", args.mesh))?;
    let mesh = Arc::new(Mesh::from_json(&text).context("invalid mesh JSON")?);

    let children: Vec<Domains> = args
        .child
        .iter()
        .map(|arg| {
            Domains::primary(split_domains(arg))
                .with_level(DomainLevel::Secondary, args.secondary.clone())
                .with_level(DomainLevel::Tertiary, args.tertiary.clone())
                .with_level(DomainLevel::Quaternary, args.quaternary.clone())
        })
        .collect();
    let composite = Domains::concatenate(&children)?;
    let bar = "=".repeat(40);

    if args.verbose {
        println!("{}", bar);
        println!("DOMAINS");
        println!("{}", bar);
        println!("{}", composite);
        for (idx, child) in children.iter().enumerate() {
            println!("child {}: {}", idx, child);
        }
        println!("{}", bar);
    }

    let child_refs: Vec<&Domains> = children.iter().collect();
    let layout = DomainLayout::compute(&composite, &child_refs, mesh)?;
    println!("{}", serde_json::to_string_pretty(&layout)?);

    Ok(())
}
