use crate::error::Result;
use algorun::engine::factory::{AlgorithmFactory, Registration};
use std::fmt::Write;
use tracing::info;

pub fn run() -> Result<()> {
    let factory = AlgorithmFactory::with_builtins();
    let registrations = factory.registrations();
    info!("Listing {} registered algorithm(s).", registrations.len());
    print!("{}", render(&registrations));
    Ok(())
}

fn render(registrations: &[Registration]) -> String {
    let name_width = registrations
        .iter()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());
    let category_width = registrations
        .iter()
        .map(|r| r.category.len())
        .max()
        .unwrap_or(0)
        .max("CATEGORY".len());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<name_width$}  {:>7}  {:<category_width$}  SUMMARY",
        "NAME", "VERSION", "CATEGORY"
    );
    for r in registrations {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:>7}  {:<category_width$}  {}",
            r.name, r.version, r.category, r.summary
        );
    }
    out
}
