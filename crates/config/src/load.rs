use crate::error::{ErrorKind, Result};
use crate::paths::Paths;
use crate::settings::Config;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variables with this prefix override file settings. Nested keys
/// use a double underscore: `OFFLOAD_UPLOAD__API_KEY`.
pub const ENV_PREFIX: &str = "OFFLOAD_";

/// Build the configuration: defaults, then the config file, then environment.
///
/// `explicit` is a file the user asked for by name and must exist. Without
/// it, the per-user config file is read if there is one. The result is not
/// validated; apply command-line overrides first, then call
/// [`Config::validate`].
pub fn load(explicit: Option<&Path>, paths: &Paths) -> Result<Config> {
    let mut figment = Figment::from(Serialized::defaults(Config::with_paths(paths)));

    let file = match explicit {
        Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
        Some(path) => Some(path),
        None if paths.config_file.is_file() => Some(paths.config_file.as_path()),
        None => {
            tracing::debug!(path = %paths.config_file.display(), "No config file; using defaults");
            None
        },
    };
    if let Some(file) = file {
        tracing::debug!(path = %file.display(), "Reading config file");
        figment = match extension(file).as_deref() {
            Some("toml") => figment.merge(Toml::file_exact(file)),
            Some("json") => figment.merge(Json::file_exact(file)),
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(file)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(file.to_path_buf())),
        };
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract::<Config>()
        .map_err(|e| ErrorKind::Invalid(e.to_string()).into())
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

/// Write an annotated sample configuration to `path`, creating parent
/// directories. Never overwrites.
pub fn write_sample(path: &Path, paths: &Paths) -> Result<PathBuf> {
    if path.exists() {
        exn::bail!(ErrorKind::AlreadyExists(path.to_path_buf()));
    }
    let mut sample = Config::with_paths(paths);
    sample.raw_extensions = [".ORF", ".CR2", ".NEF", ".ARW"].map(String::from).to_vec();
    sample.convert.profile = Some(PathBuf::from("/path/to/your/profile.pp3"));
    sample.upload.server_url = Some("https://your-immich-server.example.com".to_string());
    sample.upload.api_key = Some("your-api-key-here".to_string());
    sample.upload.album = Some("Camera Uploads".to_string());
    sample.upload.tags = ["camera", "photography"].map(String::from).to_vec();

    let body = toml::to_string_pretty(&sample).or_raise(|| ErrorKind::Write(path.to_path_buf()))?;
    let write_err = || ErrorKind::Write(path.to_path_buf());
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).or_raise(write_err)?;
    }
    let mut file = fs::File::create_new(path).or_raise(write_err)?;
    writeln!(file, "# offload configuration. Every key is optional; anything left out uses its default.").or_raise(write_err)?;
    writeln!(file, "# Environment variables override this file, e.g. {ENV_PREFIX}UPLOAD__API_KEY.\n").or_raise(write_err)?;
    file.write_all(body.as_bytes()).or_raise(write_err)?;
    Ok(path.to_path_buf())
}
