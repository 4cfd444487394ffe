//! Window and demo configuration, loaded from an optional TOML file.
//!
//! Every section is optional and every field falls back to its default, so a
//! file only needs the values it changes:
//!
//! ```toml
//! [window]
//! title = "Particles"
//! width = 1280
//! height = 720
//!
//! [particles]
//! count = 100000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::MAX_INSTANCES;

/// Highest icosahedron subdivision accepted for the displacement mesh.
pub const MAX_DETAIL: u32 = 256;

/// Errors from reading the configuration file or the command line.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    UnknownDemo(String),
    MissingDemo,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "failed to read {}: {source}", path.display()),
            Self::Parse { path, source } => write!(f, "failed to parse {}: {source}", path.display()),
            Self::UnknownDemo(name) => write!(
                f,
                "unknown demo '{name}' (expected one of: {})",
                DemoKind::names().join(", ")
            ),
            Self::MissingDemo => write!(
                f,
                "usage: sketchbook <{}> [config.toml]",
                DemoKind::names().join("|")
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::UnknownDemo(_) | Self::MissingDemo => None,
        }
    }
}

/// Window settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Sketchbook".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancingConfig {
    pub count: u32,
}

impl Default for InstancingConfig {
    fn default() -> Self {
        Self { count: 10_000 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticlesConfig {
    pub count: u32,
}

impl Default for ParticlesConfig {
    fn default() -> Self {
        Self { count: 300_000 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplacementConfig {
    /// World position of the displaced mesh.
    pub position: [f32; 3],
    /// Noise amplitude applied along each vertex.
    pub scale_distortion: f32,
    pub light_position: [f32; 3],
    /// Icosahedron subdivision level.
    pub detail: u32,
}

impl Default for DisplacementConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            scale_distortion: 0.05,
            light_position: [10.0, 10.0, 10.0],
            detail: 200,
        }
    }
}

/// Contents of a configuration file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub window: AppConfig,
    pub instancing: InstancingConfig,
    pub particles: ParticlesConfig,
    pub displacement: DisplacementConfig,
}

impl Settings {
    /// Load settings from a TOML file. Missing fields use defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The sanitized config for one demo.
    pub fn demo(&self, kind: DemoKind) -> DemoConfig {
        let config = match kind {
            DemoKind::Instancing => DemoConfig::Instancing(self.instancing.clone()),
            DemoKind::Particles => DemoConfig::Particles(self.particles.clone()),
            DemoKind::Displacement => DemoConfig::Displacement(self.displacement.clone()),
            DemoKind::EdgeOutline => DemoConfig::EdgeOutline,
        };
        config.sanitized()
    }
}

/// Which demo to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DemoKind {
    Instancing,
    Particles,
    Displacement,
    EdgeOutline,
}

impl DemoKind {
    /// All demos, in number-key order.
    pub const ALL: [DemoKind; 4] = [
        DemoKind::Instancing,
        DemoKind::Particles,
        DemoKind::Displacement,
        DemoKind::EdgeOutline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DemoKind::Instancing => "instancing",
            DemoKind::Particles => "particles",
            DemoKind::Displacement => "displacement",
            DemoKind::EdgeOutline => "edges",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| ConfigError::UnknownDemo(name.to_string()))
    }

    fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|kind| kind.name()).collect()
    }
}

/// The input a demo's kernel bundle is built from.
#[derive(Clone, Debug, PartialEq)]
pub enum DemoConfig {
    Instancing(InstancingConfig),
    Particles(ParticlesConfig),
    Displacement(DisplacementConfig),
    EdgeOutline,
}

impl DemoConfig {
    pub fn kind(&self) -> DemoKind {
        match self {
            DemoConfig::Instancing(_) => DemoKind::Instancing,
            DemoConfig::Particles(_) => DemoKind::Particles,
            DemoConfig::Displacement(_) => DemoKind::Displacement,
            DemoConfig::EdgeOutline => DemoKind::EdgeOutline,
        }
    }

    /// Clamp values the kernels cannot handle.
    ///
    /// Counts are clamped to `1..=MAX_INSTANCES` and the subdivision level to
    /// `MAX_DETAIL`; a zero-sized buffer or dispatch is never built.
    pub fn sanitized(self) -> Self {
        match self {
            DemoConfig::Instancing(mut c) => {
                c.count = clamp_count(c.count);
                DemoConfig::Instancing(c)
            }
            DemoConfig::Particles(mut c) => {
                c.count = clamp_count(c.count);
                DemoConfig::Particles(c)
            }
            DemoConfig::Displacement(mut c) => {
                c.detail = c.detail.min(MAX_DETAIL);
                DemoConfig::Displacement(c)
            }
            DemoConfig::EdgeOutline => DemoConfig::EdgeOutline,
        }
    }
}

/// Clamp an instance count to what a single buffer and dispatch can hold.
pub fn clamp_count(count: u32) -> u32 {
    count.clamp(1, MAX_INSTANCES)
}

/// Parsed command line: `sketchbook <demo> [config.toml]`.
#[derive(Debug, PartialEq)]
pub struct CliArgs {
    pub demo: DemoKind,
    pub settings_path: Option<PathBuf>,
}

impl CliArgs {
    /// Parse arguments, excluding the program name.
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        let mut args = args.into_iter();
        let demo = args.next().ok_or(ConfigError::MissingDemo)?;
        Ok(Self {
            demo: DemoKind::from_name(&demo)?,
            settings_path: args.next().map(PathBuf::from),
        })
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        match &self.settings_path {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_demo_parameters() {
        let settings = Settings::default();
        assert_eq!(
            settings.demo(DemoKind::Instancing),
            DemoConfig::Instancing(InstancingConfig { count: 10_000 })
        );
        assert_eq!(
            settings.demo(DemoKind::Particles),
            DemoConfig::Particles(ParticlesConfig { count: 300_000 })
        );
        let DemoConfig::Displacement(d) = settings.demo(DemoKind::Displacement) else {
            panic!("expected displacement config");
        };
        assert_eq!(d.scale_distortion, 0.05);
        assert_eq!(d.light_position, [10.0, 10.0, 10.0]);
        assert_eq!(d.detail, 200);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[window]
title = "Waves"

[instancing]
count = 64
"#;
        let settings: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.window.title, "Waves");
        assert_eq!(settings.window.width, 1280);
        assert_eq!(settings.instancing.count, 64);
        assert_eq!(settings.particles.count, 300_000);
    }

    #[test]
    fn zero_count_is_clamped_to_one() {
        let config = DemoConfig::Particles(ParticlesConfig { count: 0 }).sanitized();
        assert_eq!(config, DemoConfig::Particles(ParticlesConfig { count: 1 }));
        assert_eq!(clamp_count(u32::MAX), MAX_INSTANCES);
    }

    #[test]
    fn cli_parses_demo_and_optional_path() {
        let args = CliArgs::parse(["edges".to_string(), "demo.toml".to_string()]).unwrap();
        assert_eq!(args.demo, DemoKind::EdgeOutline);
        assert_eq!(args.settings_path, Some(PathBuf::from("demo.toml")));

        assert!(matches!(CliArgs::parse(Vec::new()), Err(ConfigError::MissingDemo)));
        assert!(matches!(
            CliArgs::parse(["fireworks".to_string()]),
            Err(ConfigError::UnknownDemo(_))
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Settings::load(Path::new("/nonexistent/sketchbook.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/sketchbook.toml"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
