//! Wire format between the serving process and a worker.
//!
//! One JSON document per line in each direction. Requests are
//! [`BuildJob`]s; responses are [`BuildResponse`]s tagged `"type": "build"`
//! and correlated by `id`.

use crate::error::{BuildError, ErrorDescriptor, IpcError, Result};
use crate::types::{BuildJob, BuildResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// `type` tag of build responses.
pub const BUILD_RESPONSE: &str = "build";

/// A worker's reply to one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    /// `true`: `body` is a [`BuildResult`]; `false`: an [`ErrorDescriptor`]
    pub resolved: bool,
    pub body: Value,
}

impl BuildResponse {
    pub fn success(id: &str, result: &BuildResult) -> Result<Self> {
        Ok(Self {
            kind: BUILD_RESPONSE.to_string(),
            id: id.to_string(),
            resolved: true,
            body: serde_json::to_value(result).map_err(malformed)?,
        })
    }

    pub fn failure(id: &str, err: &BuildError) -> Result<Self> {
        Ok(Self {
            kind: BUILD_RESPONSE.to_string(),
            id: id.to_string(),
            resolved: false,
            body: serde_json::to_value(ErrorDescriptor::from(err)).map_err(malformed)?,
        })
    }

    /// Whether this is a message the pool knows how to route.
    pub fn is_build(&self) -> bool {
        self.kind == BUILD_RESPONSE
    }

    /// Decode the body into the job's outcome.
    ///
    /// `entry_file` names the job's entry for errors that do not carry one.
    pub fn into_outcome(self, entry_file: &Path) -> Result<BuildResult> {
        if self.resolved {
            serde_json::from_value(self.body).map_err(malformed)
        } else {
            let descriptor: ErrorDescriptor =
                serde_json::from_value(self.body).map_err(malformed)?;
            Err(descriptor.into_error(entry_file))
        }
    }
}

/// Serialize a message as one line, newline included.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message).map_err(malformed)?;
    line.push('\n');
    Ok(line)
}

/// Parse a response line.
pub fn decode_response(line: &str) -> Result<BuildResponse> {
    serde_json::from_str(line.trim()).map_err(malformed)
}

/// Outcome of parsing a request line on the worker side.
#[derive(Debug)]
pub enum DecodedJob {
    Job(BuildJob),
    /// Unparseable, but the `id` could be recovered so the caller can be told
    Invalid { id: String, error: BuildError },
    /// Unparseable and uncorrelatable
    Garbage(BuildError),
}

/// Parse a request line.
pub fn decode_job(line: &str) -> DecodedJob {
    let value: Value = match serde_json::from_str(line.trim()) {
        Ok(value) => value,
        Err(e) => return DecodedJob::Garbage(malformed(e)),
    };
    let id = value.get("id").and_then(Value::as_str).map(str::to_string);
    match serde_json::from_value::<BuildJob>(value) {
        Ok(job) => DecodedJob::Job(job),
        Err(e) => match id {
            Some(id) => DecodedJob::Invalid {
                id,
                error: malformed(e),
            },
            None => DecodedJob::Garbage(malformed(e)),
        },
    }
}

fn malformed(e: serde_json::Error) -> BuildError {
    BuildError::Ipc(IpcError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildFlags;
    use crate::error::ErrorKind;
    use crate::types::{ArtifactPaths, BuildOptions, Checksums};
    use serde_json::json;
    use std::path::PathBuf;

    fn result() -> BuildResult {
        BuildResult {
            entry_file: PathBuf::from("/a.js"),
            applied_options: BuildFlags::default(),
            feature_summary: "mode=development".to_string(),
            checksums: Checksums {
                bundle: "00".to_string(),
                disc: None,
            },
            artifact_paths: ArtifactPaths {
                bundle_file: PathBuf::from("/tmp/x/bundle.js"),
                disc_file: None,
                temp_dir: PathBuf::from("/tmp/x"),
            },
        }
    }

    #[test]
    fn test_response_wire_shape() {
        let response = BuildResponse::success("42", &result()).unwrap();
        let line = encode_line(&response).unwrap();
        assert!(line.ends_with('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "build");
        assert_eq!(value["id"], "42");
        assert_eq!(value["resolved"], true);
        assert_eq!(value["body"]["checksums"]["bundle"], "00");
    }

    #[test]
    fn test_failure_decodes_to_error() {
        let err = BuildError::Bundler {
            entry: PathBuf::from("/a.js"),
            diagnostic: "SyntaxError".to_string(),
        };
        let line = encode_line(&BuildResponse::failure("1", &err).unwrap()).unwrap();
        let outcome = decode_response(&line)
            .unwrap()
            .into_outcome(Path::new("/a.js"));
        assert!(matches!(outcome, Err(BuildError::Bundler { .. })));
    }

    #[test]
    fn test_unknown_type_is_not_build() {
        let response =
            decode_response(r#"{"type":"log","id":"1","resolved":true,"body":null}"#).unwrap();
        assert!(!response.is_build());
    }

    #[test]
    fn test_decode_job_variants() {
        let job = BuildJob::new(PathBuf::from("/a.js"), BuildOptions::default());
        let line = encode_line(&job).unwrap();
        assert!(matches!(decode_job(&line), DecodedJob::Job(j) if j == job));

        match decode_job(&json!({ "id": "7", "entry_file": 3 }).to_string()) {
            DecodedJob::Invalid { id, error } => {
                assert_eq!(id, "7");
                assert_eq!(error.kind(), ErrorKind::Ipc);
            }
            other => panic!("expected invalid job, got {other:?}"),
        }

        assert!(matches!(decode_job("not json"), DecodedJob::Garbage(_)));
    }
}
