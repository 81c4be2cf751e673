//! Pipeline orchestrator for the field panel toolchain.
//!
//! Chains survey loading -> identity resolution -> reshape -> taxonomy
//! harmonization -> raster gap-fill -> rooting depth -> output, logging a
//! `[step/total]` header per stage and driving `indicatif` bars through
//! [`ProgressCallback`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use field_panel_cli_utils::{IndicatifProgress, MultiProgress};
use field_panel_identity::{IdentityResolver, YearMatchStats};
use field_panel_panel::output::write_panel;
use field_panel_panel::reshape::reshape;
use field_panel_panel::wide::write_wide_table;
use field_panel_parcel_models::progress::ProgressCallback;
use field_panel_parcel_models::{Panel, Year};
use field_panel_raster::{GapFillReport, GapFiller, discover_layers};
use field_panel_spatial::Reprojector;
use field_panel_survey::store::YearSnapshotStore;
use field_panel_taxonomy::{
    CropCodeTable, HarmonizeReport, RootingDepthTable, UnifiedVocabulary, attach_rooting_depth,
    harmonize,
};

use crate::config::PanelConfig;

/// Stages of a full `build` run.
enum PipelineStep {
    LoadSurveys,
    Resolve,
    Reshape,
    Harmonize,
    Vocabulary,
    GapFill,
    RootingDepth,
    Write,
}

impl PipelineStep {
    const BUILD: &[Self] = &[
        Self::LoadSurveys,
        Self::Resolve,
        Self::Reshape,
        Self::Harmonize,
        Self::Vocabulary,
        Self::GapFill,
        Self::RootingDepth,
        Self::Write,
    ];

    const RESOLVE: &[Self] = &[Self::LoadSurveys, Self::Resolve, Self::Reshape, Self::Write];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::LoadSurveys => "Loading survey layers",
            Self::Resolve => "Resolving parcel identities",
            Self::Reshape => "Reshaping to long panel",
            Self::Harmonize => "Harmonizing survey crops",
            Self::Vocabulary => "Checking crop vocabulary",
            Self::GapFill => "Filling crops from rasters",
            Self::RootingDepth => "Attaching rooting depth",
            Self::Write => "Writing outputs",
        }
    }
}

/// Everything worth reporting once a run finishes.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Reference parcels.
    pub parcels: usize,
    /// Panel rows.
    pub rows: usize,
    /// Per-year identity statistics.
    pub matches: Vec<YearMatchStats>,
    /// Harmonization rule hits.
    pub harmonized: Option<HarmonizeReport>,
    /// Rows whose crop fell outside the vocabulary.
    pub unknown_crops: usize,
    /// Raster fill statistics.
    pub gap_fill: Option<GapFillReport>,
    /// Rows with a rooting depth match.
    pub rooting_matched: usize,
    /// Rows still without a crop.
    pub missing_crops: usize,
    /// Files written.
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    /// Prints the summary to stdout.
    pub fn print(&self) {
        println!();
        println!("Parcels:        {}", self.parcels);
        println!("Panel rows:     {}", self.rows);
        for stats in &self.matches {
            println!(
                "  {}: {} accepted, {} rejected, {} without candidate",
                stats.year, stats.accepted, stats.rejected, stats.no_candidate
            );
        }
        if let Some(report) = &self.harmonized {
            println!("Harmonized:     {} labels", report.total());
            for (rule, count) in report.counts.iter().filter(|(_, n)| *n > 0) {
                println!("  {rule}: {count}");
            }
            println!("Unknown crops:  {}", self.unknown_crops);
        }
        if let Some(report) = &self.gap_fill {
            println!("Raster filled:  {}", report.filled());
            for stats in &report.years {
                println!(
                    "  {}: {} of {} ({} uncovered, {} unlabeled, {} unmapped)",
                    stats.year,
                    stats.filled,
                    stats.missing,
                    stats.no_coverage,
                    stats.unlabeled_code,
                    stats.unmapped_label
                );
            }
            if !report.years_without_raster.is_empty() {
                println!("  no raster for {:?}", report.years_without_raster);
            }
            println!("Rooting depth:  {} rows", self.rooting_matched);
        }
        println!("Missing crops:  {}", self.missing_crops);
        for path in &self.outputs {
            println!("Wrote {}", path.display());
        }
    }
}

/// Step counter that logs `[n/total] label` headers and advances the
/// overall bar.
struct Steps {
    total: usize,
    current: usize,
    bar: Arc<dyn ProgressCallback>,
}

impl Steps {
    fn new(steps: &[PipelineStep], multi: &MultiProgress) -> Self {
        Self {
            total: steps.len(),
            current: 0,
            bar: IndicatifProgress::steps_bar(multi, "Pipeline", steps.len() as u64),
        }
    }

    fn start(&mut self, step: &PipelineStep) {
        if self.current > 0 {
            self.bar.inc(1);
        }
        self.current += 1;
        log::info!("[{}/{}] {}...", self.current, self.total, step.label());
        self.bar.set_message(step.label().to_string());
    }

    fn finish(&self, msg: String) {
        self.bar.inc(1);
        self.bar.finish(msg);
    }
}

/// Runs the full pipeline.
///
/// # Errors
///
/// Returns the first error raised by any stage.
pub fn run_build(
    config: &PanelConfig,
    multi: &MultiProgress,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let pipeline_start = Instant::now();
    let mut steps = Steps::new(PipelineStep::BUILD, multi);
    let years = &config.panel.years;
    let reference_year = config.panel.reference_year;
    let mut summary = RunSummary::default();

    let mut panel = resolve_panel(config, multi, &mut steps, &mut summary)?;

    steps.start(&PipelineStep::Harmonize);
    summary.harmonized = Some(harmonize(&mut panel, reference_year));

    steps.start(&PipelineStep::Vocabulary);
    let rooting = RootingDepthTable::load(&config.reference.rooting_depth)?;
    let vocabulary = UnifiedVocabulary::with_rooting_depth(&rooting);
    summary.unknown_crops = vocabulary.enforce(&mut panel, config.output.unknown_crop);

    steps.start(&PipelineStep::GapFill);
    if config.raster.is_empty() {
        log::warn!("No raster source configured: missing crops stay null");
    } else {
        let layers = raster_layers(config)?;
        let filler = gap_filler(config)?;
        let progress = IndicatifProgress::batch_bar(multi, PipelineStep::GapFill.label());
        summary.gap_fill = Some(filler.fill(&mut panel, &layers, &progress)?);
    }

    steps.start(&PipelineStep::RootingDepth);
    summary.rooting_matched = attach_rooting_depth(&mut panel, &rooting);

    steps.start(&PipelineStep::Write);
    summary.outputs.extend(write_outputs(config, &panel)?);
    summary.rows = panel.len();
    summary.missing_crops = panel.missing_crop_count();
    steps.finish(format!("{} rows", summary.rows));

    let elapsed = pipeline_start.elapsed();
    log::info!(
        "Pipeline complete in {:.1}s ({} parcels x {} years)",
        elapsed.as_secs_f64(),
        summary.parcels,
        years.len()
    );

    Ok(summary)
}

/// Runs identity resolution and reshape only, writing the unharmonized
/// panel.
///
/// # Errors
///
/// Returns the first error raised by any stage.
pub fn run_resolve(
    config: &PanelConfig,
    multi: &MultiProgress,
) -> Result<RunSummary, Box<dyn std::error::Error>> {
    let pipeline_start = Instant::now();
    let mut steps = Steps::new(PipelineStep::RESOLVE, multi);
    let mut summary = RunSummary::default();

    let panel = resolve_panel(config, multi, &mut steps, &mut summary)?;

    steps.start(&PipelineStep::Write);
    summary.outputs.extend(write_outputs(config, &panel)?);
    summary.rows = panel.len();
    summary.missing_crops = panel.missing_crop_count();
    steps.finish(format!("{} rows", summary.rows));

    log::info!(
        "Resolution complete in {:.1}s",
        pipeline_start.elapsed().as_secs_f64()
    );

    Ok(summary)
}

/// Shared front half: load, resolve, optional wide export, reshape.
fn resolve_panel(
    config: &PanelConfig,
    multi: &MultiProgress,
    steps: &mut Steps,
    summary: &mut RunSummary,
) -> Result<Panel, Box<dyn std::error::Error>> {
    let years = &config.panel.years;
    let reference_year = config.panel.reference_year;

    steps.start(&PipelineStep::LoadSurveys);
    let progress = IndicatifProgress::batch_bar(multi, PipelineStep::LoadSurveys.label());
    let store = YearSnapshotStore::load(&config.survey, years, &config.panel.target_crs, &progress)?;

    steps.start(&PipelineStep::Resolve);
    let resolver = IdentityResolver::new(config.panel.threshold_acres)?;
    let progress = IndicatifProgress::batch_bar(multi, PipelineStep::Resolve.label());
    let resolution = resolver.resolve(&store, years, reference_year, &progress)?;
    drop(store);
    summary.parcels = resolution.table.len();
    summary.matches = resolution.stats;

    if let Some(path) = &config.output.wide_csv {
        write_wide_table(&resolution.table, years, path)?;
        summary.outputs.push(path.clone());
    }

    steps.start(&PipelineStep::Reshape);
    let panel = reshape(&resolution.table, years)?;

    Ok(panel)
}

/// Discovered rasters with explicit layers layered on top.
fn raster_layers(config: &PanelConfig) -> Result<BTreeMap<Year, PathBuf>, Box<dyn std::error::Error>> {
    let mut layers = match &config.raster.dir {
        Some(dir) => discover_layers(dir)?,
        None => BTreeMap::new(),
    };
    for (year, path) in config.raster.explicit_layers() {
        if let Some(previous) = layers.insert(year, path) {
            log::debug!("Explicit raster for {year} replaces {}", previous.display());
        }
    }
    Ok(layers)
}

fn gap_filler(config: &PanelConfig) -> Result<GapFiller, Box<dyn std::error::Error>> {
    let codes = CropCodeTable::load(&config.reference.crop_codes)?;
    let mut filler = GapFiller::new(codes)
        .with_expected_epsg(config.raster.epsg)
        .with_nodata(config.raster.nodata);

    if let Some(raster_crs) = &config.raster.crs {
        let reprojector = Reprojector::new(&config.panel.target_crs, raster_crs)?;
        if !reprojector.is_identity() {
            log::info!("Parcels will be reprojected into the raster CRS");
            filler = filler.with_reprojector(reprojector);
        }
    }

    Ok(filler)
}

fn write_outputs(
    config: &PanelConfig,
    panel: &Panel,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut written = Vec::new();
    for path in [&config.output.geojson, &config.output.csv]
        .into_iter()
        .flatten()
    {
        write_panel(panel, &config.panel.crs_name, path)?;
        written.push(path.clone());
    }
    if written.is_empty() {
        log::warn!("No panel output configured");
    }
    Ok(written)
}

/// Prints metadata and a class histogram for one raster.
///
/// # Errors
///
/// Returns an error if the raster or the optional code table cannot be
/// read.
pub fn inspect_raster(
    path: &Path,
    codes: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let raster = field_panel_raster::CategoricalRaster::open(path)?;
    let codes = codes.map(CropCodeTable::load).transpose()?;
    let transform = raster.transform();
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    println!("File:       {}", path.display());
    match field_panel_raster::year_from_file_name(name) {
        Some(year) => println!("Year:       {year}"),
        None => println!("Year:       (none in file name)"),
    }
    println!("Size:       {} x {}", raster.width(), raster.height());
    println!("Origin:     ({}, {})", transform.origin_x, transform.origin_y);
    println!(
        "Pixel:      {} x {}",
        transform.pixel_width, transform.pixel_height
    );
    if !transform.is_axis_aligned() {
        println!("Rotation:   ({}, {})", transform.rotation_x, transform.rotation_y);
    }
    match raster.epsg() {
        Some(epsg) => println!("EPSG:       {epsg}"),
        None => println!("EPSG:       (not declared)"),
    }
    match raster.nodata() {
        Some(nodata) => println!("NoData:     {nodata}"),
        None => println!("NoData:     (not declared)"),
    }

    let histogram = raster.histogram();
    let total: u64 = histogram.values().sum();
    println!("Classes:    {} ({total} valid pixels)", histogram.len());

    let mut by_count: Vec<_> = histogram.into_iter().collect();
    by_count.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (code, count) in by_count {
        let label = codes
            .as_ref()
            .and_then(|table| table.label(code))
            .unwrap_or("");
        #[allow(clippy::cast_precision_loss)]
        let share = count as f64 * 100.0 / total as f64;
        println!("  {code:>4}  {count:>12}  {share:>6.2}%  {label}");
    }

    Ok(())
}
