//! Headless CLI for the riparian buffer dashboard
//!
//! Scores parcels, resolves map views, exports choropleth figures and imports
//! replacement tables without running the API server.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riparian_geo::{
    build_figure, parcel_summary, resolve_view, ColorScale, FigureOptions, MapStyle, OverrideSet,
    ParcelStore, RiskReport, UploadTarget,
};

#[derive(Parser)]
#[command(name = "riparian")]
#[command(about = "Riparian buffer parcel risk tool", long_about = None)]
struct Cli {
    /// Path to the project's risk.toml
    #[arg(short, long, env = "RISK_CONFIG", default_value = "config/risk.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every parcel and print (or write) the risk table
    Score {
        /// Cover edit as FID:FIELD=VALUE; repeatable
        #[arg(long = "set", value_name = "FID:FIELD=VALUE")]
        edits: Vec<String>,

        /// Write the table as CSV instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the info table of one parcel instead of every parcel
        #[arg(short, long)]
        parcel_id: Option<i64>,
    },

    /// Resolve the map center and zoom for a selection
    View {
        /// Selected parcel
        #[arg(short, long)]
        parcel_id: Option<i64>,

        /// Keep the default view even when a parcel is selected
        #[arg(long)]
        no_center: bool,
    },

    /// Export the choropleth figure as JSON
    Figure {
        /// Selected parcel
        #[arg(short, long)]
        parcel_id: Option<i64>,

        /// Keep the default view even when a parcel is selected
        #[arg(long)]
        no_center: bool,

        /// Base map style (e.g. carto-positron, open-street-map)
        #[arg(long)]
        map_style: Option<String>,

        /// Color scale (e.g. reds, viridis_r)
        #[arg(long)]
        color_scale: Option<String>,

        /// Cover edit as FID:FIELD=VALUE; repeatable
        #[arg(long = "set", value_name = "FID:FIELD=VALUE")]
        edits: Vec<String>,

        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a table and overwrite the project's copy
    Import {
        /// Which table to replace (parcels, conservation)
        #[arg(short, long, default_value = "parcels")]
        target: String,

        /// CSV (or spreadsheet) to import
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .init();

    let cli = Cli::parse();
    let mut store = ParcelStore::open(&cli.config)
        .with_context(|| format!("Failed to load project {}", cli.config.display()))?;

    match cli.command {
        Commands::Score { edits, output, parcel_id } => {
            score(&store, &edits, output.as_deref(), parcel_id)?;
        }
        Commands::View { parcel_id, no_center } => {
            view(&store, parcel_id, !no_center)?;
        }
        Commands::Figure { parcel_id, no_center, map_style, color_scale, edits, output } => {
            let options = FigureArgs { parcel_id, center: !no_center, map_style, color_scale };
            figure(&store, &options, &edits, output.as_deref())?;
        }
        Commands::Import { target, file } => {
            import(&mut store, &target, &file)?;
        }
    }

    Ok(())
}

/// Parse `FID:FIELD=VALUE`
fn parse_edit(edit: &str) -> Result<(i64, String, f64)> {
    let (fid, rest) = edit
        .split_once(':')
        .with_context(|| format!("Edit '{}' is not FID:FIELD=VALUE", edit))?;
    let (field, value) = rest
        .rsplit_once('=')
        .with_context(|| format!("Edit '{}' is not FID:FIELD=VALUE", edit))?;
    let fid = fid.trim().parse().with_context(|| format!("Bad parcel id in '{}'", edit))?;
    let value = value.trim().parse().with_context(|| format!("Bad value in '{}'", edit))?;
    if field.trim().is_empty() {
        bail!("Edit '{}' has no field", edit);
    }
    Ok((fid, field.trim().to_string(), value))
}

fn build_overrides(store: &ParcelStore, edits: &[String]) -> Result<OverrideSet> {
    let mut overrides = OverrideSet::new();
    for edit in edits {
        let (fid, field, value) = parse_edit(edit)?;
        let written = overrides
            .set(store.table(), &store.config().cover_marker, fid, &[(field.clone(), Some(value))])
            .with_context(|| format!("Cannot apply '{}'", edit))?;
        if written == 0 {
            println!("{} {} is zero and was ignored", "note:".yellow(), edit);
        }
    }
    Ok(overrides)
}

fn score(store: &ParcelStore, edits: &[String], output: Option<&Path>, parcel_id: Option<i64>) -> Result<()> {
    let overrides = build_overrides(store, edits)?;
    let (table, report) = store.compute(&overrides)?;
    tracing::info!(
        "Scored {} parcels with {} cover edits",
        report.rows().len(),
        overrides.len()
    );

    if let Some(fid) = parcel_id {
        let rows = parcel_summary(
            &table,
            &report,
            &store.cover_fields(),
            &store.config().conservation_columns,
            Some(fid),
        )?;
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if let Some(path) = output {
        write_report_csv(&table.altparnos(), &report, path)?;
        println!("{} Wrote {} rows to {}", "✓".green(), report.rows().len(), path.display());
        return Ok(());
    }

    if report.is_degenerate() {
        println!(
            "{} every parcel has the same cumulative risk; normalized risk is undefined",
            "warning:".yellow()
        );
    }

    print!("{:<8} {:<16}", "fid", "ALTPARNO");
    for field in report.risk_fields() {
        print!(" {:>10}", field);
    }
    println!(" {:>10} {:>10}", "cum_risk", "normalized");
    println!("{}", "-".repeat(48 + 11 * report.risk_fields().len()));

    for (row, altparno) in report.rows().iter().zip(table.altparnos()) {
        print!("{:<8} {:<16}", row.fid, altparno);
        for score in &row.sub_scores {
            print!(" {:>10.2}", score);
        }
        let normalized = row
            .normalized
            .map(|n| format!("{:.3}", n))
            .unwrap_or_else(|| "-".to_string());
        let cumulative = format!("{:>10.2}", row.cumulative);
        let cumulative = match row.normalized {
            Some(n) if n >= 0.75 => cumulative.as_str().red(),
            Some(n) if n >= 0.4 => cumulative.as_str().yellow(),
            _ => cumulative.as_str().normal(),
        };
        println!(" {} {:>10}", cumulative, normalized);
    }

    Ok(())
}

fn write_report_csv(altparnos: &[String], report: &RiskReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut header = vec!["fid".to_string(), "ALTPARNO".to_string()];
    header.extend(report.risk_fields().iter().cloned());
    header.push("cum_risk".to_string());
    header.push("cum_risk_normalized".to_string());
    writer.write_record(&header)?;

    for (row, altparno) in report.rows().iter().zip(altparnos) {
        let mut record = vec![row.fid.to_string(), altparno.clone()];
        record.extend(row.sub_scores.iter().map(|s| s.to_string()));
        record.push(row.cumulative.to_string());
        record.push(row.normalized.map(|n| n.to_string()).unwrap_or_default());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn view(store: &ParcelStore, parcel_id: Option<i64>, center: bool) -> Result<()> {
    let view = resolve_view(parcel_id, center, store.geometries(), &store.config().map)?;
    println!("{}", "Map view".bold());
    println!("  center: {:.6}, {:.6}", view.center.lat, view.center.lon);
    println!("  zoom:   {}", view.zoom);
    Ok(())
}

struct FigureArgs {
    parcel_id: Option<i64>,
    center: bool,
    map_style: Option<String>,
    color_scale: Option<String>,
}

fn figure(store: &ParcelStore, args: &FigureArgs, edits: &[String], output: Option<&Path>) -> Result<()> {
    let map = &store.config().map;
    let map_style: MapStyle = args.map_style.as_deref().unwrap_or(&map.style).parse()?;
    let color_scale: ColorScale = args.color_scale.as_deref().unwrap_or(&map.color_scale).parse()?;
    let view = resolve_view(args.parcel_id, args.center, store.geometries(), map)?;

    let overrides = build_overrides(store, edits)?;
    let (table, report) = store.compute(&overrides)?;
    let options = FigureOptions { map_style, color_scale, view, opacity: map.opacity };
    let figure = build_figure(&table, &report, store.geometries(), &options);
    tracing::info!(
        "Built figure with {} parcels on {}",
        figure.geojson.features.len(),
        options.map_style
    );
    let json = serde_json::to_string_pretty(&figure)?;

    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{} Wrote figure with {} parcels to {}",
                "✓".green(),
                figure.geojson.features.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn import(store: &mut ParcelStore, target: &str, file: &Path) -> Result<()> {
    let target: UploadTarget = target.parse()?;
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    match store.import(target, &bytes, &filename) {
        Ok(outcome) => {
            tracing::info!("Imported {} from {}", outcome.target.display(), file.display());
            println!(
                "{} Imported {} rows into {}",
                "✓".green(),
                outcome.rows,
                outcome.target.display()
            );
            Ok(())
        }
        Err(riparian_geo::StoreError::Import(e)) => {
            tracing::warn!("Rejected upload {}: {}", file.display(), e);
            println!("{} {}", "✗".red(), e.user_message());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_edit() {
        assert_eq!(parse_edit("7:%cover41=0.4").unwrap(), (7, "%cover41".to_string(), 0.4));
        assert!(parse_edit("7-%cover41=0.4").is_err());
        assert!(parse_edit("x:%cover41=0.4").is_err());
        assert!(parse_edit("7:=0.4").is_err());
        assert!(parse_edit("7:%cover41=high").is_err());
    }

    #[test]
    fn test_report_csv() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("risk.toml"),
            r#"
[data]
parcels = "cata_data.csv"
geometry = "parcels.geojson"

[[cover_columns]]
column = "%cover22"
new_column = "risk22"
default = 3.0
thresholds = [{ check = 0.5, value = 1.0 }]
"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("cata_data.csv"), "fid,ALTPARNO,%cover22\n1,A,0.1\n2,B,0.9\n").unwrap();
        std::fs::write(
            dir.path().join("parcels.geojson"),
            r#"{"type":"FeatureCollection","features":[]}"#,
        )
        .unwrap();

        let store = ParcelStore::open(&dir.path().join("risk.toml")).unwrap();
        let (table, report) = store.compute(&OverrideSet::new()).unwrap();
        let out = dir.path().join("scores.csv");
        write_report_csv(&table.altparnos(), &report, &out).unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(
            written,
            "fid,ALTPARNO,risk22,cum_risk,cum_risk_normalized\n1,A,1,1,0\n2,B,3,3,1\n"
        );

        let overrides = build_overrides(&store, &["1:%cover22=0.8".to_string()]).unwrap();
        let (_, report) = store.compute(&overrides).unwrap();
        assert!(report.is_degenerate());
    }
}
