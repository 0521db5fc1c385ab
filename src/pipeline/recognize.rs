//! Text recognition: PNG page → text + mean confidence, via Tesseract.
//!
//! ## One recognizer per run
//!
//! A [`RecognizerFactory`] builds exactly one [`Recognizer`] per pipeline
//! run, after rasterisation succeeded, and the run drops it when it ends,
//! however it ends. Recognizers are never shared between runs, which is why
//! [`Recognizer::recognize`] takes `&mut self`.
//!
//! ## Backends
//!
//! | Backend              | Availability        | How it runs Tesseract                        |
//! |----------------------|---------------------|----------------------------------------------|
//! | [`TesseractCli`]     | always              | `tesseract` executable, one process per page |
//! | `NativeTesseract`    | feature `tesseract` | libtesseract on a dedicated worker thread    |
//!
//! Both report confidence on a 0.0–1.0 scale.

use crate::config::{EngineMode, ParameterSet, SegmentationMode};
use crate::error::OcrError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// What a recognizer is configured with, fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerSettings {
    /// Directory holding `*.traineddata`; `None` uses Tesseract's default.
    pub tessdata_dir: Option<PathBuf>,
    /// One or more language codes joined by `+`, e.g. `deu+eng`.
    pub language: String,
    pub engine_mode: EngineMode,
    pub segmentation_mode: SegmentationMode,
}

impl RecognizerSettings {
    pub fn from_params(params: &ParameterSet, tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            tessdata_dir,
            language: params.language.clone(),
            engine_mode: params.engine_mode,
            segmentation_mode: params.segmentation_mode,
        }
    }
}

impl From<&ParameterSet> for RecognizerSettings {
    fn from(params: &ParameterSet) -> Self {
        Self::from_params(params, None)
    }
}

/// Text and mean confidence of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0.0–1.0.
    pub mean_confidence: f32,
}

impl Recognition {
    /// Normalise raw engine output: missing text becomes `""`, confidence is
    /// clamped into 0.0–1.0 (NaN counts as 0.0).
    pub fn normalized(text: Option<String>, confidence: f32) -> Self {
        let mean_confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            text: text.unwrap_or_default(),
            mean_confidence,
        }
    }
}

/// A configured OCR engine instance, owned by one pipeline run.
#[async_trait]
pub trait Recognizer: Send {
    /// Recognise one PNG-encoded page.
    async fn recognize(&mut self, png: &[u8]) -> Result<Recognition, OcrError>;
}

/// Builds one [`Recognizer`] per pipeline run.
#[async_trait]
pub trait RecognizerFactory: Send + Sync {
    /// Initialise an engine. Failures (missing language data, missing
    /// binary) are [`OcrError::RecognitionFailure`].
    async fn create(&self, settings: &RecognizerSettings) -> Result<Box<dyn Recognizer>, OcrError>;
}

// ── Tesseract executable ─────────────────────────────────────────────────

/// Default executable name, resolved through `PATH`.
pub const DEFAULT_TESSERACT_BIN: &str = "tesseract";

/// Factory for [`TesseractCli`] recognizers.
#[derive(Debug, Clone)]
pub struct TesseractCliFactory {
    binary: PathBuf,
}

impl Default for TesseractCliFactory {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_TESSERACT_BIN),
        }
    }
}

impl TesseractCliFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific `tesseract` executable.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

#[async_trait]
impl RecognizerFactory for TesseractCliFactory {
    async fn create(&self, settings: &RecognizerSettings) -> Result<Box<dyn Recognizer>, OcrError> {
        Ok(Box::new(self.build(settings).await?))
    }
}

impl TesseractCliFactory {
    async fn build(&self, settings: &RecognizerSettings) -> Result<TesseractCli, OcrError> {
        let version = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                OcrError::recognition(format!(
                    "cannot run '{}': {}",
                    self.binary.display(),
                    e
                ))
            })?;
        if !version.status.success() {
            return Err(OcrError::recognition(format!(
                "'{} --version' exited with {}",
                self.binary.display(),
                version.status
            )));
        }

        if let Some(dir) = &settings.tessdata_dir {
            if !dir.is_dir() {
                return Err(OcrError::recognition(format!(
                    "tessdata directory '{}' does not exist",
                    dir.display()
                )));
            }
        }

        let scratch = tempfile::Builder::new()
            .prefix("pdfocr-")
            .tempdir()
            .map_err(|e| OcrError::recognition(format!("cannot create scratch directory: {}", e)))?;

        info!(
            "Tesseract CLI ready (lang={}, oem={}, psm={})",
            settings.language,
            settings.engine_mode.code(),
            settings.segmentation_mode.code()
        );

        Ok(TesseractCli {
            binary: self.binary.clone(),
            settings: settings.clone(),
            scratch,
            seq: 0,
        })
    }
}

/// Recognizer that runs the `tesseract` executable once per page.
///
/// Page images and outputs live in a scratch directory that is removed when
/// the recognizer is dropped.
pub struct TesseractCli {
    binary: PathBuf,
    settings: RecognizerSettings,
    scratch: tempfile::TempDir,
    seq: usize,
}

impl TesseractCli {
    /// Arguments after `<image> <outbase>`.
    fn engine_args(settings: &RecognizerSettings) -> Vec<String> {
        let mut args = vec![
            "--oem".to_string(),
            settings.engine_mode.code().to_string(),
            "--psm".to_string(),
            settings.segmentation_mode.code().to_string(),
            "-l".to_string(),
            settings.language.clone(),
        ];
        if let Some(dir) = &settings.tessdata_dir {
            args.push("--tessdata-dir".to_string());
            args.push(dir.display().to_string());
        }
        // Output configs: plain text and word-level TSV (for confidences).
        args.push("txt".to_string());
        args.push("tsv".to_string());
        args
    }
}

#[async_trait]
impl Recognizer for TesseractCli {
    async fn recognize(&mut self, png: &[u8]) -> Result<Recognition, OcrError> {
        self.seq += 1;
        let stem = format!("page-{:04}", self.seq);
        let image_path = self.scratch.path().join(format!("{stem}.png"));
        let out_base = self.scratch.path().join(&stem);

        tokio::fs::write(&image_path, png)
            .await
            .map_err(|e| OcrError::recognition(format!("cannot write page image: {}", e)))?;

        let output = tokio::process::Command::new(&self.binary)
            .arg(&image_path)
            .arg(&out_base)
            .args(Self::engine_args(&self.settings))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OcrError::recognition(format!("cannot run tesseract: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let txt_path = out_base.with_extension("txt");
        let tsv_path = out_base.with_extension("tsv");
        let outputs = async {
            let text = tokio::fs::read_to_string(&txt_path)
                .await
                .map_err(|e| OcrError::recognition(format!("cannot read tesseract text output: {}", e)))?;
            let tsv = tokio::fs::read_to_string(&tsv_path)
                .await
                .map_err(|e| OcrError::recognition(format!("cannot read tesseract TSV output: {}", e)))?;
            Ok::<_, OcrError>((text, tsv))
        }
        .await;

        // Best effort; the scratch dir is removed on drop anyway.
        for path in [&image_path, &txt_path, &tsv_path] {
            let _ = tokio::fs::remove_file(path).await;
        }

        let (text, tsv) = outputs?;
        let confidence = parse_tsv_confidence(&tsv);
        debug!(
            "Tesseract page {}: {} chars, conf {:.2}",
            self.seq,
            text.len(),
            confidence
        );
        Ok(Recognition::normalized(Some(text), confidence))
    }
}

/// Mean word confidence from Tesseract TSV output, scaled to 0.0–1.0.
///
/// Only word rows (level 5) with a non-negative `conf` count. A page without
/// words scores 0.0.
pub fn parse_tsv_confidence(tsv: &str) -> f32 {
    let mut header = None;
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for line in tsv.lines() {
        let cols: Vec<&str> = line.split('\t').collect();
        let Some((level_col, conf_col)) = header else {
            let level = cols.iter().position(|c| *c == "level");
            let conf = cols.iter().position(|c| *c == "conf");
            if let (Some(l), Some(c)) = (level, conf) {
                header = Some((l, c));
            }
            continue;
        };

        if cols.get(level_col).and_then(|v| v.trim().parse::<u8>().ok()) != Some(5) {
            continue;
        }
        if let Some(conf) = cols.get(conf_col).and_then(|v| v.trim().parse::<f64>().ok()) {
            if conf >= 0.0 {
                sum += conf;
                count += 1;
            }
        }
    }

    if count == 0 {
        0.0
    } else {
        (sum / count as f64 / 100.0) as f32
    }
}

// ── In-process Tesseract ─────────────────────────────────────────────────

#[cfg(feature = "tesseract")]
pub use native::{NativeTesseract, NativeTesseractFactory};

#[cfg(feature = "tesseract")]
mod native {
    //! libtesseract behind a worker thread.
    //!
    //! The engine handle is not `Sync` and its builder methods consume it, so
    //! a single thread owns it for the whole run and pages are sent to it over
    //! a channel.

    use super::{Recognition, Recognizer, RecognizerFactory, RecognizerSettings};
    use crate::config::{EngineMode, SegmentationMode};
    use crate::error::OcrError;
    use async_trait::async_trait;
    use std::sync::mpsc;
    use tesseract::{OcrEngineMode, PageSegMode, Tesseract};
    use tokio::sync::oneshot;
    use tracing::{debug, info};

    type Reply = oneshot::Sender<Result<Recognition, OcrError>>;

    /// Factory for [`NativeTesseract`] recognizers.
    #[derive(Debug, Clone, Default)]
    pub struct NativeTesseractFactory;

    #[async_trait]
    impl RecognizerFactory for NativeTesseractFactory {
        async fn create(
            &self,
            settings: &RecognizerSettings,
        ) -> Result<Box<dyn Recognizer>, OcrError> {
            let (job_tx, job_rx) = mpsc::channel::<(Vec<u8>, Reply)>();
            let (ready_tx, ready_rx) = oneshot::channel::<Result<(), OcrError>>();
            let settings = settings.clone();

            std::thread::Builder::new()
                .name("pdfocr-tesseract".to_string())
                .spawn(move || worker(settings, ready_tx, job_rx))
                .map_err(|e| OcrError::recognition(format!("cannot spawn worker: {}", e)))?;

            ready_rx
                .await
                .map_err(|_| OcrError::unexpected("Tesseract worker exited during init"))??;

            Ok(Box::new(NativeTesseract { jobs: job_tx }))
        }
    }

    /// Recognizer owning one libtesseract engine for the run.
    ///
    /// Dropping it closes the job channel, which ends the worker thread and
    /// frees the engine.
    pub struct NativeTesseract {
        jobs: mpsc::Sender<(Vec<u8>, Reply)>,
    }

    #[async_trait]
    impl Recognizer for NativeTesseract {
        async fn recognize(&mut self, png: &[u8]) -> Result<Recognition, OcrError> {
            let (tx, rx) = oneshot::channel();
            self.jobs
                .send((png.to_vec(), tx))
                .map_err(|_| OcrError::recognition("Tesseract worker is gone"))?;
            rx.await
                .map_err(|_| OcrError::unexpected("Tesseract worker dropped a page"))?
        }
    }

    fn oem(mode: EngineMode) -> OcrEngineMode {
        match mode {
            EngineMode::TesseractOnly => OcrEngineMode::TesseractOnly,
            EngineMode::LstmOnly => OcrEngineMode::LstmOnly,
            EngineMode::TesseractAndLstm => OcrEngineMode::TesseractLstmCombined,
            EngineMode::Default => OcrEngineMode::Default,
        }
    }

    fn psm(mode: SegmentationMode) -> PageSegMode {
        match mode {
            SegmentationMode::OsdOnly => PageSegMode::PsmOsdOnly,
            SegmentationMode::AutoOsd => PageSegMode::PsmAutoOsd,
            SegmentationMode::AutoOnly => PageSegMode::PsmAutoOnly,
            SegmentationMode::Auto => PageSegMode::PsmAuto,
            SegmentationMode::SingleColumn => PageSegMode::PsmSingleColumn,
            SegmentationMode::SingleBlockVertText => PageSegMode::PsmSingleBlockVertText,
            SegmentationMode::SingleBlock => PageSegMode::PsmSingleBlock,
            SegmentationMode::SingleLine => PageSegMode::PsmSingleLine,
            SegmentationMode::SingleWord => PageSegMode::PsmSingleWord,
            SegmentationMode::CircleWord => PageSegMode::PsmCircleWord,
            SegmentationMode::SingleChar => PageSegMode::PsmSingleChar,
            SegmentationMode::SparseText => PageSegMode::PsmSparseText,
            SegmentationMode::SparseTextOsd => PageSegMode::PsmSparseTextOsd,
            SegmentationMode::RawLine => PageSegMode::PsmRawLine,
        }
    }

    fn worker(
        settings: RecognizerSettings,
        ready: oneshot::Sender<Result<(), OcrError>>,
        jobs: mpsc::Receiver<(Vec<u8>, Reply)>,
    ) {
        let datapath = settings
            .tessdata_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let init = Tesseract::new_with_oem(
            datapath.as_deref(),
            Some(settings.language.as_str()),
            oem(settings.engine_mode),
        )
        .map_err(|e| OcrError::recognition(format!("engine init failed: {}", e)));

        let mut engine = match init {
            Ok(engine) => {
                info!(
                    "libtesseract ready (lang={}, oem={})",
                    settings.language,
                    settings.engine_mode.code()
                );
                let _ = ready.send(Ok(()));
                Some(engine)
            }
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

        while let Ok((png, reply)) = jobs.recv() {
            let result = match engine.take() {
                Some(e) => match run_page(e, &png, psm(settings.segmentation_mode)) {
                    Ok((e, recognition)) => {
                        engine = Some(e);
                        Ok(recognition)
                    }
                    Err(err) => Err(err),
                },
                None => Err(OcrError::recognition("engine unusable after an earlier failure")),
            };
            let _ = reply.send(result);
        }
        debug!("libtesseract worker exiting");
    }

    fn run_page(
        engine: Tesseract,
        png: &[u8],
        mode: PageSegMode,
    ) -> Result<(Tesseract, Recognition), OcrError> {
        let mut engine = engine
            .set_image_from_mem(png)
            .map_err(|e| OcrError::recognition(format!("cannot load page image: {}", e)))?;
        engine.set_page_seg_mode(mode);
        let mut engine = engine
            .recognize()
            .map_err(|e| OcrError::recognition(format!("recognition failed: {}", e)))?;
        let text = engine.get_text().ok();
        let conf = engine.mean_text_conf() as f32 / 100.0;
        Ok((engine, Recognition::normalized(text, conf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3508\t-1\t
2\t1\t1\t0\t0\t0\t200\t300\t900\t60\t-1\t
4\t1\t1\t1\t1\t0\t200\t300\t900\t60\t-1\t
5\t1\t1\t1\t1\t1\t200\t300\t200\t60\t96.5\tHello
5\t1\t1\t1\t1\t2\t420\t300\t300\t60\t83.5\tWorld
5\t1\t1\t1\t1\t3\t740\t300\t40\t60\t-1\t
";

    #[test]
    fn tsv_confidence_is_mean_of_words() {
        let conf = parse_tsv_confidence(TSV);
        assert!((conf - 0.90).abs() < 1e-6, "got {conf}");
    }

    #[test]
    fn tsv_without_words_scores_zero() {
        let only_header = TSV.lines().take(4).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_tsv_confidence(&only_header), 0.0);
        assert_eq!(parse_tsv_confidence(""), 0.0);
        assert_eq!(parse_tsv_confidence("garbage\nmore garbage"), 0.0);
    }

    #[test]
    fn recognition_is_normalized() {
        let r = Recognition::normalized(None, 1.7);
        assert_eq!(r.text, "");
        assert_eq!(r.mean_confidence, 1.0);
        assert_eq!(Recognition::normalized(None, -0.2).mean_confidence, 0.0);
        assert_eq!(Recognition::normalized(None, f32::NAN).mean_confidence, 0.0);
        let r = Recognition::normalized(Some("abc\n".into()), 0.42);
        assert_eq!(r.text, "abc\n");
        assert_eq!(r.mean_confidence, 0.42);
    }

    #[test]
    fn settings_follow_parameters() {
        let params = ParameterSet {
            language: "eng".into(),
            segmentation_mode: SegmentationMode::SparseText,
            ..Default::default()
        };
        let s = RecognizerSettings::from_params(&params, Some(PathBuf::from("/opt/tessdata")));
        assert_eq!(s.language, "eng");
        assert_eq!(s.engine_mode, EngineMode::LstmOnly);
        assert_eq!(s.segmentation_mode, SegmentationMode::SparseText);
        assert_eq!(s.tessdata_dir.as_deref(), Some(Path::new("/opt/tessdata")));
        assert_eq!(RecognizerSettings::from(&params).tessdata_dir, None);
    }

    #[test]
    fn cli_arguments() {
        let settings = RecognizerSettings {
            tessdata_dir: Some(PathBuf::from("/data/tess")),
            language: "deu+eng".into(),
            engine_mode: EngineMode::LstmOnly,
            segmentation_mode: SegmentationMode::SingleColumn,
        };
        assert_eq!(
            TesseractCli::engine_args(&settings),
            vec![
                "--oem", "1", "--psm", "4", "-l", "deu+eng", "--tessdata-dir", "/data/tess",
                "txt", "tsv"
            ]
        );

        let settings = RecognizerSettings {
            tessdata_dir: None,
            ..settings
        };
        let args = TesseractCli::engine_args(&settings);
        assert!(!args.iter().any(|a| a == "--tessdata-dir"));
    }

    /// Writes an executable stand-in for `tesseract` that answers
    /// `--version` and runs `body` for a page (`$2` is the output base).
    #[cfg(unix)]
    fn fake_tesseract(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("tesseract");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'tesseract 5.3.0'; exit 0; fi\n{body}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn page_outputs_are_removed_after_reading() {
        let bin_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(
            bin_dir.path(),
            "printf 'Hello\\n' > \"$2.txt\"\n\
             printf 'level\\tconf\\ttext\\n5\\t88\\tHello\\n' > \"$2.tsv\"",
        );
        let factory = TesseractCliFactory::with_binary(bin);
        let mut cli = factory
            .build(&RecognizerSettings::from(&ParameterSet::default()))
            .await
            .unwrap();

        for _ in 0..2 {
            let r = cli.recognize(b"png bytes").await.unwrap();
            assert_eq!(r.text, "Hello\n");
            assert!((r.mean_confidence - 0.88).abs() < 1e-6);
        }
        let leftovers = std::fs::read_dir(cli.scratch.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_text_output_is_a_recognition_failure() {
        let bin_dir = tempfile::tempdir().unwrap();
        let bin = fake_tesseract(
            bin_dir.path(),
            "printf 'level\\tconf\\ttext\\n' > \"$2.tsv\"",
        );
        let factory = TesseractCliFactory::with_binary(bin);
        let mut cli = factory
            .build(&RecognizerSettings::from(&ParameterSet::default()))
            .await
            .unwrap();

        let err = cli.recognize(b"png bytes").await.unwrap_err();
        assert!(matches!(err, OcrError::RecognitionFailure { .. }), "got {err:?}");
        assert!(err.to_string().contains("text output"));
        assert_eq!(std::fs::read_dir(cli.scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_binary_is_a_recognition_failure() {
        let factory = TesseractCliFactory::with_binary("/nonexistent/bin/tesseract-xyz");
        let settings = RecognizerSettings::from(&ParameterSet::default());
        let err = match factory.create(&settings).await {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert!(matches!(err, OcrError::RecognitionFailure { .. }), "got {err:?}");
    }
}
