//! CloudConvert v2 wire types and the job state derived from them.

use serde::Deserialize;
use serde_json::{Map, Value};

/// Every API response wraps its payload in `data`; failures carry `message` instead.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Processing,
    Finished,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub name: Option<String>,
    pub operation: Operation,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Operation {
    #[serde(rename = "import/upload")]
    ImportUpload,
    #[serde(rename = "convert")]
    Convert,
    #[serde(rename = "export/url")]
    ExportUrl,
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub form: Option<UploadForm>,
    #[serde(default)]
    pub files: Vec<ExportedFile>,
}

/// Where and how to POST the source file for an `import/upload` task.
#[derive(Debug, Deserialize)]
pub struct UploadForm {
    pub url: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ExportedFile {
    #[serde(default)]
    pub filename: Option<String>,
    pub url: String,
}

impl Job {
    pub fn task(&self, operation: Operation) -> Option<&Task> {
        self.tasks.iter().find(|t| t.operation == operation)
    }

    /// Upload target of the import task, if the job exposes one.
    pub fn upload_form(&self) -> Option<&UploadForm> {
        self.task(Operation::ImportUpload)
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.form.as_ref())
    }

    fn export_url(&self) -> Option<&str> {
        self.task(Operation::ExportUrl)
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.files.first())
            .map(|f| f.url.as_str())
    }

    fn failure_message(&self) -> Option<&str> {
        self.tasks
            .iter()
            .find(|t| t.status == JobStatus::Error)
            .and_then(|t| t.message.as_deref())
    }
}

/// Progress of a remote job as seen by one status check.
///
/// The export URL only exists inside `Finished`, so nothing can be downloaded
/// before the job is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Uploading,
    Converting,
    Finished { download_url: String },
    Error { message: String },
}

impl JobState {
    pub fn from_job(job: &Job) -> Self {
        match job.status {
            JobStatus::Error => Self::Error {
                message: match job.failure_message() {
                    Some(reason) => format!("Conversion failed: {}", reason),
                    None => "Conversion failed".to_string(),
                },
            },
            JobStatus::Finished => match job.export_url() {
                Some(url) => Self::Finished {
                    download_url: url.to_string(),
                },
                None => Self::Error {
                    message: "Conversion finished without a download URL".to_string(),
                },
            },
            _ => {
                let stage_status = |op| job.task(op).map(|t| t.status);
                match stage_status(Operation::ImportUpload) {
                    Some(JobStatus::Finished) => Self::Converting,
                    Some(JobStatus::Processing) => Self::Uploading,
                    _ => Self::Pending,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(value: Value) -> Job {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_created_job_exposes_upload_form() {
        let job = job(json!({
            "id": "job-1",
            "status": "waiting",
            "tasks": [
                {
                    "name": "upload",
                    "operation": "import/upload",
                    "status": "waiting",
                    "result": {
                        "form": {
                            "url": "https://upload.example/bucket",
                            "parameters": { "key": "abc", "expires": 1700000000 }
                        }
                    }
                },
                { "name": "convert", "operation": "convert", "status": "waiting" },
                { "name": "export", "operation": "export/url", "status": "waiting" }
            ]
        }));

        let form = job.upload_form().unwrap();
        assert_eq!(form.url, "https://upload.example/bucket");
        assert_eq!(form.parameters.len(), 2);
        assert_eq!(JobState::from_job(&job), JobState::Pending);
    }

    #[test]
    fn test_in_flight_states() {
        let uploading = job(json!({
            "id": "j", "status": "processing",
            "tasks": [{ "operation": "import/upload", "status": "processing" }]
        }));
        assert_eq!(JobState::from_job(&uploading), JobState::Uploading);

        let converting = job(json!({
            "id": "j", "status": "processing",
            "tasks": [
                { "operation": "import/upload", "status": "finished" },
                { "operation": "convert", "status": "processing" }
            ]
        }));
        assert_eq!(JobState::from_job(&converting), JobState::Converting);
    }

    #[test]
    fn test_finished_job_yields_download_url() {
        let finished = job(json!({
            "id": "j", "status": "finished",
            "tasks": [{
                "operation": "export/url", "status": "finished",
                "result": { "files": [{ "filename": "a.pdf", "url": "https://dl.example/a.pdf" }] }
            }]
        }));
        assert_eq!(
            JobState::from_job(&finished),
            JobState::Finished {
                download_url: "https://dl.example/a.pdf".to_string()
            }
        );
    }

    #[test]
    fn test_error_job_reports_task_message() {
        let failed = job(json!({
            "id": "j", "status": "error",
            "tasks": [{ "operation": "convert", "status": "error", "message": "Unsupported input" }]
        }));
        assert_eq!(
            JobState::from_job(&failed),
            JobState::Error {
                message: "Conversion failed: Unsupported input".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_values_are_tolerated() {
        let odd = job(json!({
            "id": "j", "status": "paused",
            "tasks": [{ "operation": "metadata/write", "status": "queued" }]
        }));
        assert_eq!(odd.status, JobStatus::Unknown);
        assert_eq!(odd.tasks[0].operation, Operation::Other);
        assert_eq!(JobState::from_job(&odd), JobState::Pending);
    }
}
