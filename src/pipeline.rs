use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::ResolvedConfig;
use crate::domain::{Mode, SampleId, Stage};
use crate::engine::{AnalysisEngine, Artifact, ArtifactKind, ImportRequest, Invocation};
use crate::error::PipelineError;
use crate::fs_util;
use crate::samples::PairingIssue;
use crate::staging::{ProjectStager, StagingLayout};

pub mod files {
    pub const PAIRED_SAMPLE_DATA: &str = "paired-sample-data.qza";
    pub const METADATA_TABULATE: &str = "sample-metadata-tabulate.qzv";
    pub const DEMUX_SUMMARY: &str = "demux_summary.qzv";
    pub const TABLE: &str = "table-dada2.qza";
    pub const REP_SEQS: &str = "rep-seqs-dada2.qza";
    pub const DENOISING_STATS: &str = "denoising-stats-dada2.qza";
    pub const TABLE_SUMMARY: &str = "table-dada2-summary.qzv";
    pub const REP_SEQS_SUMMARY: &str = "rep-seqs-summary.qzv";
    pub const ALIGNED_REP_SEQS: &str = "aligned-rep-seqs.qza";
    pub const MASKED_ALIGNED_REP_SEQS: &str = "masked-aligned-rep-seqs.qza";
    pub const UNROOTED_TREE: &str = "unrooted-tree.qza";
    pub const ROOTED_TREE: &str = "rooted-tree.qza";
    pub const NEWICK_TREE: &str = "newick.tree";
    pub const ALPHA_RAREFACTION: &str = "alpha-rarefaction.qzv";
    pub const TAXONOMY: &str = "taxonomy.qza";
    pub const TAXONOMY_VIZ: &str = "taxonomy.qzv";
    pub const TAXONOMY_BARPLOT: &str = "taxonomy_barplot.qzv";
    pub const CORE_METRICS_DIR: &str = "core-metrics-results";
    pub const EMPEROR_PLOTS: [&str; 4] = [
        "unweighted_unifrac_emperor.qzv",
        "weighted_unifrac_emperor.qzv",
        "jaccard_emperor.qzv",
        "bray_curtis_emperor.qzv",
    ];
    pub const FAITH_PD_VECTOR: &str = "faith_pd_vector.qza";
    pub const EVENNESS_VECTOR: &str = "evenness_vector.qza";
    pub const UNWEIGHTED_UNIFRAC_DISTANCE: &str = "unweighted_unifrac_distance_matrix.qza";
    pub const FAITH_PD_SIGNIFICANCE: &str = "faith-pd-group-significance.qzv";
    pub const EVENNESS_SIGNIFICANCE: &str = "evenness-group-significance.qzv";
    pub const UNWEIGHTED_UNIFRAC_SIGNIFICANCE: &str =
        "unweighted-unifrac-beta-group-significance.qzv";
    pub const MANIFEST: &str = "pipeline-manifest.json";
}

const CASAVA_FORMAT: &str = "CasavaOneEightSingleLanePerSampleDirFmt";
const EXPORTED_TREE: &str = "tree.nwk";

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub metadata: Utf8PathBuf,
    pub classifier: Option<Utf8PathBuf>,
    pub mode: Mode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Running { stage: Stage },
    Done,
    Failed { stage: Stage, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub artifacts: Vec<Utf8PathBuf>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub mode: Mode,
    pub state: RunState,
    pub output_dir: Utf8PathBuf,
    pub samples: Vec<SampleId>,
    pub stages: Vec<StageRecord>,
    pub pairing_issues: Vec<PairingIssue>,
    pub symlink_collisions: Vec<Utf8PathBuf>,
    pub engine: Option<String>,
    pub tool: String,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl RunReport {
    pub fn executed_stages(&self) -> Vec<Stage> {
        self.stages.iter().map(|record| record.stage).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Option<Stage>,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Default)]
struct RunArtifacts {
    demux: Option<Artifact>,
    table: Option<Artifact>,
    rep_seqs: Option<Artifact>,
    masked_alignment: Option<Artifact>,
    rooted_tree: Option<Artifact>,
    taxonomy: Option<Artifact>,
}

fn require<'a>(slot: &'a Option<Artifact>, name: &str) -> Result<&'a Artifact, PipelineError> {
    slot.as_ref().ok_or_else(|| {
        PipelineError::EngineInvocation(format!("{name} artifact has not been produced"))
    })
}

fn output_at(produced: &[Artifact], index: usize, name: &str) -> Result<Artifact, PipelineError> {
    produced.get(index).cloned().ok_or_else(|| {
        PipelineError::EngineInvocation(format!("engine returned no {name} artifact"))
    })
}

pub struct Pipeline<E: AnalysisEngine> {
    engine: E,
    config: ResolvedConfig,
}

impl<E: AnalysisEngine> Pipeline<E> {
    pub fn new(engine: E, config: ResolvedConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn run(
        &self,
        request: &RunRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, PipelineError> {
        let classifier = self.preflight(request)?;

        let started_at = chrono::Utc::now().to_rfc3339();
        let convention = self.config.naming.convention();
        let mut report = RunReport {
            mode: request.mode,
            state: RunState::Running {
                stage: Stage::Setup,
            },
            output_dir: request.output_dir.clone(),
            samples: Vec::new(),
            stages: Vec::new(),
            pairing_issues: Vec::new(),
            symlink_collisions: Vec::new(),
            engine: self.engine.tool_info(),
            tool: format!("ampliconpipeline/{}", env!("CARGO_PKG_VERSION")),
            started_at,
            finished_at: None,
        };

        sink.event(ProgressEvent {
            stage: Some(Stage::Setup),
            message: format!("staging reads from {}", request.input_dir),
            elapsed: None,
        });
        let start = Instant::now();
        let staging = match ProjectStager::new(convention.as_ref())
            .stage(&request.output_dir, &request.input_dir)
        {
            Ok(staging) => staging,
            Err(err) => {
                self.record_setup_failure(&request.output_dir, &mut report, &err);
                return Err(err);
            }
        };
        let elapsed = start.elapsed();
        report.samples = staging.samples.clone();
        report.pairing_issues = staging.issues.clone();
        report.symlink_collisions = staging.collisions.clone();
        report.stages.push(StageRecord {
            stage: Stage::Setup,
            artifacts: staging.links.clone(),
            elapsed_ms: elapsed.as_millis(),
        });
        sink.event(ProgressEvent {
            stage: Some(Stage::Setup),
            message: format!("staged {} samples", staging.samples.len()),
            elapsed: Some(elapsed),
        });

        let layout = staging.layout;
        let mut artifacts = RunArtifacts::default();
        for stage in request.mode.stages().filter(|stage| *stage != Stage::Setup) {
            report.state = RunState::Running { stage };
            sink.event(ProgressEvent {
                stage: Some(stage),
                message: "started".to_string(),
                elapsed: None,
            });
            let start = Instant::now();
            let outcome = self
                .execute(stage, &layout, request, classifier.as_ref(), &mut artifacts)
                .and_then(|produced| {
                    ensure_persisted(&produced)?;
                    Ok(produced)
                });
            let elapsed = start.elapsed();
            match outcome {
                Ok(produced) => {
                    report.stages.push(StageRecord {
                        stage,
                        artifacts: produced
                            .iter()
                            .map(|artifact| artifact.path().to_path_buf())
                            .collect(),
                        elapsed_ms: elapsed.as_millis(),
                    });
                    sink.event(ProgressEvent {
                        stage: Some(stage),
                        message: format!("saved {} file(s)", produced.len()),
                        elapsed: Some(elapsed),
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    report.state = RunState::Failed {
                        stage,
                        message: message.clone(),
                    };
                    report.finished_at = Some(chrono::Utc::now().to_rfc3339());
                    self.write_manifest(&layout, &report);
                    return Err(PipelineError::StageFailed { stage, message });
                }
            }
        }

        report.state = RunState::Done;
        report.finished_at = Some(chrono::Utc::now().to_rfc3339());
        self.write_manifest(&layout, &report);
        info!("pipeline completed, output in {}", request.output_dir);
        Ok(report)
    }

    fn preflight(&self, request: &RunRequest) -> Result<Option<Artifact>, PipelineError> {
        if request.mode.requires_classifier() && request.classifier.is_none() {
            return Err(PipelineError::MissingClassifier);
        }
        if !request.input_dir.as_std_path().is_dir() {
            return Err(PipelineError::MissingInput(request.input_dir.clone()));
        }
        if !request.metadata.as_std_path().is_file() {
            return Err(PipelineError::MissingInput(request.metadata.clone()));
        }
        let classifier = match (&request.classifier, request.mode.requires_classifier()) {
            (Some(path), true) => {
                if !path.as_std_path().is_file() {
                    return Err(PipelineError::MissingInput(path.clone()));
                }
                Some(Artifact::new(ArtifactKind::Classifier, path.clone()))
            }
            _ => None,
        };
        StagingLayout::ensure_absent(&request.output_dir)?;
        Ok(classifier)
    }

    fn execute(
        &self,
        stage: Stage,
        layout: &StagingLayout,
        request: &RunRequest,
        classifier: Option<&Artifact>,
        artifacts: &mut RunArtifacts,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let out = |name: &str| layout.analysis_path(name);
        let metadata = request.metadata.as_path();
        let threads = self.config.threads;

        match stage {
            Stage::Setup => Ok(Vec::new()),
            Stage::Import => {
                info!("creating sample data artifact from {}", layout.data_dir());
                let demux = self.engine.import(&ImportRequest {
                    kind: ArtifactKind::PairedSequences,
                    input_path: layout.data_dir().to_path_buf(),
                    output_path: out(files::PAIRED_SAMPLE_DATA),
                    input_format: Some(CASAVA_FORMAT.to_string()),
                })?;
                artifacts.demux = Some(demux.clone());
                Ok(vec![demux])
            }
            Stage::MetadataViz => self.engine.invoke_checked(
                &Invocation::new("metadata", "tabulate")
                    .metadata("input", metadata)
                    .output(
                        "visualization",
                        ArtifactKind::Visualization,
                        out(files::METADATA_TABULATE),
                    ),
            ),
            Stage::DemuxSummary => {
                let demux = require(&artifacts.demux, "paired sequence data")?;
                self.engine.invoke_checked(
                    &Invocation::new("demux", "summarize")
                        .input("data", demux)
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::DEMUX_SUMMARY),
                        ),
                )
            }
            Stage::Denoise => {
                let demux = require(&artifacts.demux, "paired sequence data")?;
                let params = &self.config.denoise;
                let produced = self.engine.invoke_checked(
                    &Invocation::new("dada2", "denoise-paired")
                        .input("demultiplexed-seqs", demux)
                        .param("trim-left-f", params.trim_left_f)
                        .param("trim-left-r", params.trim_left_r)
                        .param("trunc-len-f", params.trunc_len_f)
                        .param("trunc-len-r", params.trunc_len_r)
                        .param("chimera-method", &params.chimera_method)
                        .param("n-threads", threads)
                        .output("table", ArtifactKind::FeatureTable, out(files::TABLE))
                        .output(
                            "representative-sequences",
                            ArtifactKind::RepresentativeSequences,
                            out(files::REP_SEQS),
                        )
                        .output(
                            "denoising-stats",
                            ArtifactKind::DenoisingStats,
                            out(files::DENOISING_STATS),
                        ),
                )?;
                artifacts.table = Some(output_at(&produced, 0, "feature table")?);
                artifacts.rep_seqs = Some(output_at(&produced, 1, "representative sequences")?);
                Ok(produced)
            }
            Stage::DenoiseViz => {
                let table = require(&artifacts.table, "feature table")?;
                let rep_seqs = require(&artifacts.rep_seqs, "representative sequences")?;
                let mut produced = self.engine.invoke_checked(
                    &Invocation::new("feature-table", "summarize")
                        .input("table", table)
                        .metadata("sample-metadata", metadata)
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::TABLE_SUMMARY),
                        ),
                )?;
                produced.extend(self.engine.invoke_checked(
                    &Invocation::new("feature-table", "tabulate-seqs")
                        .input("data", rep_seqs)
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::REP_SEQS_SUMMARY),
                        ),
                )?);
                Ok(produced)
            }
            Stage::AlignMask => {
                let rep_seqs = require(&artifacts.rep_seqs, "representative sequences")?;
                let mut produced = self.engine.invoke_checked(
                    &Invocation::new("alignment", "mafft")
                        .input("sequences", rep_seqs)
                        .param("n-threads", threads)
                        .output(
                            "alignment",
                            ArtifactKind::Alignment,
                            out(files::ALIGNED_REP_SEQS),
                        ),
                )?;
                let aligned = output_at(&produced, 0, "alignment")?;
                let masked = self.engine.invoke_checked(
                    &Invocation::new("alignment", "mask")
                        .input("alignment", &aligned)
                        .output(
                            "masked-alignment",
                            ArtifactKind::MaskedAlignment,
                            out(files::MASKED_ALIGNED_REP_SEQS),
                        ),
                )?;
                artifacts.masked_alignment = Some(output_at(&masked, 0, "masked alignment")?);
                produced.extend(masked);
                Ok(produced)
            }
            Stage::Tree => {
                let masked = require(&artifacts.masked_alignment, "masked alignment")?;
                let mut produced = self.engine.invoke_checked(
                    &Invocation::new("phylogeny", "fasttree")
                        .input("alignment", masked)
                        .param("n-threads", threads)
                        .output("tree", ArtifactKind::UnrootedTree, out(files::UNROOTED_TREE)),
                )?;
                let unrooted = output_at(&produced, 0, "unrooted tree")?;
                let rooted = self.engine.invoke_checked(
                    &Invocation::new("phylogeny", "midpoint-root")
                        .input("tree", &unrooted)
                        .output(
                            "rooted-tree",
                            ArtifactKind::RootedTree,
                            out(files::ROOTED_TREE),
                        ),
                )?;
                artifacts.rooted_tree = Some(output_at(&rooted, 0, "rooted tree")?);
                produced.extend(rooted);
                Ok(produced)
            }
            Stage::ExportTree => {
                let rooted = require(&artifacts.rooted_tree, "rooted tree")?;
                let export_dir = tempfile::Builder::new()
                    .prefix("tree-export")
                    .tempdir_in(layout.analysis_dir().as_std_path())
                    .map_err(|err| PipelineError::Filesystem(err.to_string()))?;
                let export_path = fs_util::to_utf8(export_dir.path().to_path_buf())?;
                self.engine.export(rooted, &export_path)?;
                let exported = export_path.join(EXPORTED_TREE);
                if !exported.as_std_path().is_file() {
                    return Err(PipelineError::EngineInvocation(format!(
                        "tree export did not produce {EXPORTED_TREE}"
                    )));
                }
                let newick = out(files::NEWICK_TREE);
                fs_util::move_file(&exported, &newick)?;
                Ok(vec![Artifact::new(ArtifactKind::NewickTree, newick)])
            }
            Stage::Rarefaction => {
                let table = require(&artifacts.table, "feature table")?;
                let rooted = require(&artifacts.rooted_tree, "rooted tree")?;
                self.engine.invoke_checked(
                    &Invocation::new("diversity", "alpha-rarefaction")
                        .input("table", table)
                        .input("phylogeny", rooted)
                        .param("max-depth", self.config.diversity.max_depth)
                        .metadata("metadata", metadata)
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::ALPHA_RAREFACTION),
                        ),
                )
            }
            Stage::Classify => {
                let classifier = classifier.ok_or(PipelineError::MissingClassifier)?;
                let rep_seqs = require(&artifacts.rep_seqs, "representative sequences")?;
                let produced = self.engine.invoke_checked(
                    &Invocation::new("feature-classifier", "classify-sklearn")
                        .input("classifier", classifier)
                        .input("reads", rep_seqs)
                        .param("n-jobs", threads)
                        .output(
                            "classification",
                            ArtifactKind::Taxonomy,
                            out(files::TAXONOMY),
                        ),
                )?;
                artifacts.taxonomy = Some(output_at(&produced, 0, "taxonomy")?);
                Ok(produced)
            }
            Stage::ClassifyViz => {
                let table = require(&artifacts.table, "feature table")?;
                let taxonomy = require(&artifacts.taxonomy, "taxonomy")?;
                let mut produced = self.engine.invoke_checked(
                    &Invocation::new("metadata", "tabulate")
                        .metadata("input", taxonomy.path())
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::TAXONOMY_VIZ),
                        ),
                )?;
                produced.extend(self.engine.invoke_checked(
                    &Invocation::new("taxa", "barplot")
                        .input("table", table)
                        .input("taxonomy", taxonomy)
                        .metadata("metadata", metadata)
                        .output(
                            "visualization",
                            ArtifactKind::Visualization,
                            out(files::TAXONOMY_BARPLOT),
                        ),
                )?);
                Ok(produced)
            }
            Stage::Diversity => self.run_diversity(layout, metadata, artifacts),
        }
    }

    fn run_diversity(
        &self,
        layout: &StagingLayout,
        metadata: &Utf8Path,
        artifacts: &RunArtifacts,
    ) -> Result<Vec<Artifact>, PipelineError> {
        let table = require(&artifacts.table, "feature table")?;
        let rooted = require(&artifacts.rooted_tree, "rooted tree")?;
        let params = &self.config.diversity;
        let core_dir = layout.analysis_path(files::CORE_METRICS_DIR);

        let mut core = Invocation::new("diversity", "core-metrics-phylogenetic")
            .input("phylogeny", rooted)
            .input("table", table)
            .param("sampling-depth", params.sampling_depth)
            .metadata("metadata", metadata)
            .output(
                "faith-pd-vector",
                ArtifactKind::AlphaDiversity,
                core_dir.join(files::FAITH_PD_VECTOR),
            )
            .output(
                "evenness-vector",
                ArtifactKind::AlphaDiversity,
                core_dir.join(files::EVENNESS_VECTOR),
            )
            .output(
                "unweighted-unifrac-distance-matrix",
                ArtifactKind::DistanceMatrix,
                core_dir.join(files::UNWEIGHTED_UNIFRAC_DISTANCE),
            );
        for plot in files::EMPEROR_PLOTS {
            let name = plot.trim_end_matches(".qzv").replace('_', "-");
            core = core.output(&name, ArtifactKind::Visualization, core_dir.join(plot));
        }
        let mut produced = self.engine.invoke_checked(&core.output_dir(core_dir.clone()))?;

        let faith_pd = output_at(&produced, 0, "faith pd vector")?;
        let evenness = output_at(&produced, 1, "evenness vector")?;
        let unifrac = output_at(&produced, 2, "unweighted unifrac distance")?;

        for (vector, file_name) in [
            (&faith_pd, files::FAITH_PD_SIGNIFICANCE),
            (&evenness, files::EVENNESS_SIGNIFICANCE),
        ] {
            produced.extend(self.engine.invoke_checked(
                &Invocation::new("diversity", "alpha-group-significance")
                    .input("alpha-diversity", vector)
                    .metadata("metadata", metadata)
                    .output(
                        "visualization",
                        ArtifactKind::Visualization,
                        layout.analysis_path(file_name),
                    ),
            )?);
        }

        produced.extend(self.engine.invoke_checked(
            &Invocation::new("diversity", "beta-group-significance")
                .input("distance-matrix", &unifrac)
                .metadata_column("metadata", metadata, &params.beta_group_column)
                .output(
                    "visualization",
                    ArtifactKind::Visualization,
                    layout.analysis_path(files::UNWEIGHTED_UNIFRAC_SIGNIFICANCE),
                ),
        )?);
        Ok(produced)
    }

    fn record_setup_failure(
        &self,
        root: &Utf8Path,
        report: &mut RunReport,
        err: &PipelineError,
    ) {
        let layout = StagingLayout::new(root);
        if matches!(err, PipelineError::OutputDirExists(_))
            || !layout.analysis_dir().as_std_path().is_dir()
        {
            return;
        }
        report.state = RunState::Failed {
            stage: Stage::Setup,
            message: err.to_string(),
        };
        report.finished_at = Some(chrono::Utc::now().to_rfc3339());
        self.write_manifest(&layout, report);
    }

    fn write_manifest(&self, layout: &StagingLayout, report: &RunReport) {
        let path = layout.analysis_path(files::MANIFEST);
        if let Err(err) = fs_util::write_json_atomic(&path, report) {
            warn!("could not write run manifest {path}: {err}");
        }
    }
}

fn ensure_persisted(produced: &[Artifact]) -> Result<(), PipelineError> {
    for artifact in produced {
        if !artifact.path().as_std_path().exists() {
            return Err(PipelineError::EngineInvocation(format!(
                "{} was not persisted",
                artifact.path()
            )));
        }
    }
    Ok(())
}
