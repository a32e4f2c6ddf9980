//! Per-file processing: load, normalize, quantify, write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use burn_ndarray::NdArray;
use loci_core::image::Image;
use loci_core::LociError;
use loci_metrics::atlas::CEREBRAL_GRAY;
use loci_metrics::decouple::with_suffix;
use loci_metrics::{
    AdniStyleRescaler, DecoupleAdapter, DecoupledResult, MaskAtlas, Metric, MetricEngine, MetricResult, Modality,
    VolumeSource,
};
use loci_model::{
    load_weights, DecomposeNetwork, DecomposeNetworkConfig, LandmarkNetwork, LandmarkNetworkConfig, WarpNetwork,
    WarpNetworkConfig,
};
use loci_normalize::{
    ArtifactSink, NiftiArtifactSink, NonlinearWarper, NormalizationMode, NormalizationOrchestrator,
    NormalizationResult, RigidAligner,
};

use crate::settings::Settings;

pub type Backend = NdArray<f32>;
type Device = <Backend as burn::tensor::backend::Backend>::Device;
type Orchestrator = NormalizationOrchestrator<Backend, LandmarkNetwork<Backend>, WarpNetwork<Backend>>;
type Decoupler = DecoupleAdapter<Backend, DecomposeNetwork<Backend>>;

/// What to do with each input.
#[derive(Debug, Clone)]
pub struct Job {
    pub metrics: Vec<Metric>,
    pub mode: NormalizationMode,
    /// Quantify the input as given.
    pub skip_normalization: bool,
    pub debug: bool,
    /// Write the ADNI PET core style volume to the output path.
    pub adni_style: bool,
    pub decouple: Option<Modality>,
}

impl Job {
    /// Whether each input produces volumes under the output path.
    pub fn writes_volumes(&self) -> bool {
        !self.skip_normalization || self.adni_style || self.decouple.is_some()
    }
}

/// Scalar outputs of one decoupling run.
#[derive(Debug, Clone, PartialEq)]
pub struct DecouplingReport {
    pub modality: Modality,
    pub ad_probability: f64,
    pub adad_score: f64,
    pub adad_values: BTreeMap<String, f64>,
}

impl DecouplingReport {
    fn new(modality: Modality, result: &DecoupledResult<Backend>) -> Self {
        Self {
            modality,
            ad_probability: result.ad_probability,
            adad_score: result.adad_score,
            adad_values: result.adad_values.clone(),
        }
    }

    /// Row for `results.csv`: `AD_probability`, `ADAD` and the per-tracer conversions.
    pub fn to_metric_result(&self) -> MetricResult {
        let mut values = self.adad_values.clone();
        values.insert("AD_probability".to_string(), self.ad_probability);
        values.insert("ADAD".to_string(), self.adad_score);
        MetricResult {
            metric_name: format!("Decouple-{}", self.modality),
            ratio: None,
            values,
        }
    }
}

/// Results of one input; failed metrics are listed beside the successes.
#[derive(Debug, Default)]
pub struct FileReport {
    pub results: Vec<MetricResult>,
    pub failures: Vec<String>,
    pub decoupled: Option<DecouplingReport>,
}

/// Sink whose destination is switched per input file.
#[derive(Default)]
struct RoutedSink {
    target: Mutex<Option<NiftiArtifactSink>>,
}

impl RoutedSink {
    fn route(&self, target: Option<NiftiArtifactSink>) {
        if let Ok(mut slot) = self.target.lock() {
            *slot = target;
        }
    }
}

impl ArtifactSink<Backend> for RoutedSink {
    fn save(&self, tag: &str, image: &Image<Backend, 3>) -> loci_core::Result<()> {
        let slot = self
            .target
            .lock()
            .map_err(|_| LociError::external("artifact sink lock poisoned"))?;
        match slot.as_ref() {
            Some(sink) => sink.save(tag, image),
            None => Ok(()),
        }
    }
}

/// `<dir>/<name>` without its `.nii` / `.nii.gz` extension.
pub fn nifti_stem(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = name
        .strip_suffix(".nii.gz")
        .or_else(|| name.strip_suffix(".nii"))
        .unwrap_or(&name);
    path.with_file_name(stem)
}

/// One loaded pipeline. Not shared between threads; batch mode builds one per worker.
pub struct Runner {
    job: Job,
    device: Device,
    orchestrator: Option<Orchestrator>,
    engine: MetricEngine<Backend>,
    adni: Option<AdniStyleRescaler<Backend>>,
    decoupler: Option<Decoupler>,
    temp_dir: PathBuf,
    debug: Arc<RoutedSink>,
    scratch: Arc<RoutedSink>,
}

impl Runner {
    pub fn new(settings: &Settings, job: Job, source: Arc<dyn VolumeSource<Backend>>) -> Result<Self> {
        let device = Device::default();
        let debug = Arc::new(RoutedSink::default());
        let scratch = Arc::new(RoutedSink::default());
        let orchestrator = if job.skip_normalization {
            None
        } else {
            let orchestrator = build_orchestrator(settings, source.as_ref(), &device)?
                .with_debug(debug.clone())
                .with_scratch(scratch.clone());
            Some(orchestrator)
        };
        let adni_template = if job.adni_style || job.decouple.is_some() {
            let template = source
                .load(&settings.templates.adni_pet_core)
                .context("failed to load the ADNI PET core template")?;
            Some(template)
        } else {
            None
        };
        let decoupler = job
            .decouple
            .map(|modality| build_decoupler(settings, modality, &device))
            .transpose()?;

        let atlas = MaskAtlas::new(settings.metrics.masks.clone(), source);
        let engine = MetricEngine::new(settings.metrics.clone(), atlas)?;
        let adni = match adni_template {
            Some(template) => {
                let cerebral_gray = engine
                    .atlas()
                    .mask(CEREBRAL_GRAY)
                    .context("failed to load the cerebral gray mask")?;
                Some(AdniStyleRescaler::new(cerebral_gray, template))
            }
            None => None,
        };
        Ok(Self {
            job,
            device,
            orchestrator,
            engine,
            adni,
            decoupler,
            temp_dir: settings.temp_dir.clone(),
            debug,
            scratch,
        })
    }

    /// Process `input`. The normalized volume and any fill-states mask are
    /// written next to `output`. With ADNI-style output the output path holds
    /// the rescaled rigid volume instead, and decoupled volumes go beside it.
    pub fn process(&self, input: &Path, output: Option<&Path>) -> Result<FileReport> {
        let image: Image<Backend, 3> = loci_io::read_nifti(input, &self.device)
            .with_context(|| format!("failed to read {}", input.display()))?;

        let (rigid, image) = match &self.orchestrator {
            Some(orchestrator) => {
                let result = self.normalize(orchestrator, image, input, output)?;
                (result.rigid_aligned, result.normalized)
            }
            None => (image.clone(), image),
        };

        let mut report = FileReport::default();
        for (metric, outcome) in self.engine.calculate_all(&image, &self.job.metrics) {
            match outcome {
                Ok(outcome) => {
                    if let (Some(mask), Some(path)) = (&outcome.mask, output) {
                        let mask_path = with_suffix(path, "_fillstates_mask");
                        loci_io::write_nifti(&mask_path, mask)
                            .with_context(|| format!("failed to write {}", mask_path.display()))?;
                    }
                    report.results.push(outcome.result);
                }
                Err(e) => report.failures.push(format!("{}: {}", metric, e)),
            }
        }

        if let Some(rescaler) = &self.adni {
            let adni = rescaler.prepare(&rigid, &image)?;
            if let Some(path) = output {
                loci_io::write_nifti(path, &adni).with_context(|| format!("failed to write {}", path.display()))?;
                tracing::info!(path = %path.display(), "ADNI-style image written");
            }
            if let Some(decoupler) = &self.decoupler {
                let result = decoupler.decouple(&adni)?;
                if let Some(path) = output {
                    result.save(path)?;
                }
                report.decoupled = Some(DecouplingReport::new(decoupler.modality(), &result));
            }
        }
        Ok(report)
    }

    fn normalize(
        &self,
        orchestrator: &Orchestrator,
        image: Image<Backend, 3>,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<NormalizationResult<Backend>> {
        self.debug.route(match output {
            Some(path) if self.job.debug => Some(NiftiArtifactSink::prefixed(nifti_stem(path))),
            _ => None,
        });
        let scratch_dir = input
            .file_name()
            .map(|name| self.temp_dir.join(nifti_stem(Path::new(name))))
            .unwrap_or_else(|| self.temp_dir.clone());
        self.scratch.route(Some(NiftiArtifactSink::directory(scratch_dir)));

        let result = orchestrator.normalize(image, self.job.mode)?;
        if let Some(report) = &result.iterations {
            tracing::info!(
                iterations = report.iterations,
                converged = report.converged,
                shift_mm = ?report.final_shift_mm,
                "iterative alignment finished"
            );
        }
        if let Some(path) = output {
            loci_io::write_nifti(path, &result.normalized)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "normalized image written");
        }
        Ok(result)
    }
}

fn build_orchestrator(settings: &Settings, source: &dyn VolumeSource<Backend>, device: &Device) -> Result<Orchestrator> {
    let template = source
        .load(&settings.templates.padded)
        .context("failed to load the padded template")?;

    let landmarks = LandmarkNetworkConfig::new().init::<Backend>(device);
    let landmarks = load_weights(landmarks, &settings.models.rigid, device)
        .with_context(|| format!("failed to load rigid model {}", settings.models.rigid.display()))?;
    let warp = WarpNetworkConfig::new().init::<Backend>(device);
    let warp = load_weights(warp, &settings.models.warp, device)
        .with_context(|| format!("failed to load warp model {}", settings.models.warp.display()))?;

    let aligner = RigidAligner::new(landmarks, template.clone());
    let warper = NonlinearWarper::new(warp, template, settings.normalization.crop)?;
    Ok(NormalizationOrchestrator::new(aligner, warper))
}

fn build_decoupler(settings: &Settings, modality: Modality, device: &Device) -> Result<Decoupler> {
    let config = settings.metrics.decouple.modality(modality);
    let mut models = Vec::with_capacity(config.models.len());
    for path in &config.models {
        let network = DecomposeNetworkConfig::new().init::<Backend>(device);
        let network = load_weights(network, path, device)
            .with_context(|| format!("failed to load decomposition model {}", path.display()))?;
        models.push(network);
    }
    tracing::debug!(%modality, models = models.len(), "decomposition ensemble loaded");
    Ok(DecoupleAdapter::new(modality, models, config.tracers.clone())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nifti_stem() {
        assert_eq!(nifti_stem(Path::new("/out/sub01.nii.gz")), PathBuf::from("/out/sub01"));
        assert_eq!(nifti_stem(Path::new("sub01.nii")), PathBuf::from("sub01"));
        assert_eq!(nifti_stem(Path::new("/out/raw")), PathBuf::from("/out/raw"));
    }

    #[test]
    fn test_routed_sink_drops_when_unrouted() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Device::default();
        let image = Image::from_values(vec![1.0; 8], [2, 2, 2], &Default::default(), &device)?;

        let sink = RoutedSink::default();
        sink.save("rigid", &image)?;
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

        sink.route(Some(NiftiArtifactSink::directory(dir.path())));
        sink.save("rigid", &image)?;
        assert!(dir.path().join("rigid.nii").exists());
        Ok(())
    }

    fn decouple_job(modality: Modality) -> Job {
        Job {
            metrics: vec![],
            mode: NormalizationMode::from_flags(false, false, 1, 1.0),
            skip_normalization: true,
            debug: false,
            adni_style: false,
            decouple: Some(modality),
        }
    }

    #[test]
    fn test_decouple_requires_models() -> anyhow::Result<()> {
        let settings = Settings::parse("", Path::new("/cfg"))?;
        let source = Arc::new(loci_metrics::InMemorySource::<Backend>::new());
        let err = Runner::new(&settings, decouple_job(Modality::Tau), source).err().unwrap();
        assert!(format!("{:#}", err).contains("ADNI PET core template"));

        let err = build_decoupler(&settings, Modality::Tau, &Device::default()).err().unwrap();
        assert!(format!("{:#}", err).contains("no decomposition models"));

        let text = "[decouple.abeta]\nmodels = [\"missing/abeta_0\"]\n";
        let settings = Settings::parse(text, Path::new("/cfg"))?;
        let err = build_decoupler(&settings, Modality::Abeta, &Device::default()).err().unwrap();
        assert!(format!("{:#}", err).contains("failed to load decomposition model"));
        Ok(())
    }

    #[test]
    fn test_decouple_writes_adni_and_component_volumes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let device = Device::default();

        let weights = dir.path().join("tau_0");
        loci_model::save_weights(DecomposeNetworkConfig::new().init::<Backend>(&device), &weights)?;
        let text = format!(
            "[decouple.tau]\nmodels = [{:?}]\n\n[decouple.tau.tracers.ftp]\nslope = 2.0\nintercept = 1.0\n",
            weights
        );
        let settings = Settings::parse(&text, dir.path())?;

        let metadata = Default::default();
        let ones = Image::<Backend, 3>::from_values(vec![1.0; 512], [8, 8, 8], &metadata, &device)?;
        let source = loci_metrics::InMemorySource::new()
            .with(settings.templates.adni_pet_core.clone(), ones.clone())
            .with(settings.metrics.masks[CEREBRAL_GRAY].clone(), ones);

        let input = dir.path().join("sub01.nii");
        loci_io::write_nifti(&input, &Image::<Backend, 3>::from_values(vec![2.0; 512], [8, 8, 8], &metadata, &device)?)?;
        let output = dir.path().join("out").join("sub01.nii");
        std::fs::create_dir_all(output.parent().unwrap())?;

        let runner = Runner::new(&settings, decouple_job(Modality::Tau), Arc::new(source))?;
        let report = runner.process(&input, Some(&output))?;

        let adni: Image<Backend, 3> = loci_io::read_nifti(&output, &device)?;
        let values = adni.data().clone().into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (v - 1.0).abs() < 1e-5));
        for suffix in ["_stripped_image", "_stripped_component", "_AD_prob_map"] {
            assert!(with_suffix(&output, suffix).exists(), "{} missing", suffix);
        }

        let decoupled = report.decoupled.unwrap();
        assert_eq!(decoupled.modality, Modality::Tau);
        assert!((0.0..=1.0).contains(&decoupled.ad_probability));
        assert!((decoupled.adad_values["ftp"] - (2.0 * decoupled.adad_score + 1.0)).abs() < 1e-9);

        let row = decoupled.to_metric_result();
        assert_eq!(row.metric_name, "Decouple-tau");
        assert_eq!(row.values["ADAD"], decoupled.adad_score);
        Ok(())
    }
}
