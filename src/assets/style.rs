use std::{
    fs,
    path::{Path, PathBuf},
};

use lightningcss::{
    printer::PrinterOptions,
    stylesheet::{MinifyOptions, ParserOptions, StyleSheet},
    targets::{Browsers, Targets},
};

use crate::error::{DevflowError, Result};

const STAGE: &str = "sass";

fn version(major: u32, minor: u32) -> Option<u32> {
    Some((major << 16) | (minor << 8))
}

/// Browsers the vendor prefixes are generated for.
pub fn default_browsers() -> Browsers {
    Browsers {
        android: version(4, 4),
        chrome: version(49, 0),
        edge: version(14, 0),
        firefox: version(52, 0),
        ie: version(11, 0),
        ios_saf: version(9, 0),
        safari: version(9, 0),
        ..Browsers::default()
    }
}

/// SCSS entry → CSS with vendor prefixes → `<out_dir>/<stem>.css`.
#[derive(Debug, Clone)]
pub struct StyleCompiler {
    pub entry: PathBuf,
    pub load_paths: Vec<PathBuf>,
    pub out_dir: PathBuf,
    pub browsers: Browsers,
}

impl StyleCompiler {
    pub fn new(entry: PathBuf, load_paths: Vec<PathBuf>, out_dir: PathBuf) -> Self {
        Self {
            entry,
            load_paths,
            out_dir,
            browsers: default_browsers(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        let stem = self
            .entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "style".to_string());
        self.out_dir.join(format!("{}.css", stem))
    }

    /// Compiles and writes the stylesheet, returning the written path.
    pub fn compile(&self) -> Result<PathBuf> {
        let css = compile_scss(&self.entry, &self.load_paths)?;
        let prefixed = add_vendor_prefixes(&css, &self.entry, self.browsers)?;

        fs::create_dir_all(&self.out_dir)?;
        let output = self.output_path();
        fs::write(&output, prefixed)?;

        tracing::debug!("Wrote {}", output.display());
        Ok(output)
    }
}

pub fn compile_scss(entry: &Path, load_paths: &[PathBuf]) -> Result<String> {
    let options = load_paths
        .iter()
        .fold(grass::Options::default(), |options, path| options.load_path(path))
        .style(grass::OutputStyle::Expanded);

    grass::from_path(entry, &options).map_err(|e| DevflowError::transform(STAGE, e.to_string()))
}

pub fn add_vendor_prefixes(css: &str, source: &Path, browsers: Browsers) -> Result<String> {
    let targets = Targets::from(browsers);

    let mut stylesheet = StyleSheet::parse(
        css,
        ParserOptions {
            filename: source.to_string_lossy().to_string(),
            ..Default::default()
        },
    )
    .map_err(|e| DevflowError::transform(STAGE, e.to_string()))?;

    stylesheet
        .minify(MinifyOptions {
            targets,
            ..Default::default()
        })
        .map_err(|e| DevflowError::transform(STAGE, e.to_string()))?;

    let result = stylesheet
        .to_css(PrinterOptions {
            targets,
            ..Default::default()
        })
        .map_err(|e| DevflowError::transform(STAGE, e.to_string()))?;

    Ok(result.code)
}
