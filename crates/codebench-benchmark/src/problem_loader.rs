use std::sync::Arc;

use async_trait::async_trait;
use codebench_core::{Problem, TestCase};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use tokio::sync::OnceCell;

pub const FIXED_RANDOM_SEED: u64 = 42;

#[derive(Debug, thiserror::Error)]
pub enum DatasetLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Dataset source returned status {0}")]
    Status(u16),
    #[error("Malformed dataset row at line {line}: {source}")]
    Row {
        line: usize,
        source: serde_json::Error,
    },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where the problem corpus comes from.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Problem>, DatasetLoadError>;
}

/// Line-delimited JSON corpus read from an `http(s)://` URL or a local path.
pub struct JsonlDatasetSource {
    location: String,
    client: reqwest::Client,
}

impl JsonlDatasetSource {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn read_text(&self) -> Result<String, DatasetLoadError> {
        let is_remote =
            self.location.starts_with("http://") || self.location.starts_with("https://");
        if !is_remote {
            return Ok(tokio::fs::read_to_string(&self.location).await?);
        }

        let resp = self.client.get(&self.location).send().await?;
        if !resp.status().is_success() {
            return Err(DatasetLoadError::Status(resp.status().as_u16()));
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl DatasetSource for JsonlDatasetSource {
    async fn fetch(&self) -> Result<Vec<Problem>, DatasetLoadError> {
        tracing::info!("Loading problem corpus from {}", self.location);
        let text = self.read_text().await?;
        parse_corpus(&text)
    }
}

// =============================================================================
// Row decoding
// =============================================================================

#[derive(Debug, Deserialize)]
struct DatasetRow {
    #[serde(default)]
    question_id: String,
    #[serde(default)]
    question_content: String,
    #[serde(default)]
    starter_code: Option<String>,
    #[serde(default)]
    public_test_cases: RawTestCases,
    #[serde(default)]
    private_test_cases: RawTestCases,
}

/// Test-case fields arrive either as a JSON array or as a string holding one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTestCases {
    Decoded(Vec<RawTestCase>),
    Encoded(String),
}

impl Default for RawTestCases {
    fn default() -> Self {
        RawTestCases::Decoded(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
struct RawTestCase {
    #[serde(default)]
    input: String,
    #[serde(default)]
    output: String,
}

impl RawTestCases {
    fn into_test_cases(self) -> Vec<TestCase> {
        let raw = match self {
            RawTestCases::Decoded(cases) => cases,
            RawTestCases::Encoded(text) if text.trim().is_empty() => Vec::new(),
            RawTestCases::Encoded(text) => match serde_json::from_str(&text) {
                Ok(cases) => cases,
                Err(e) => {
                    tracing::warn!("Discarding undecodable test cases: {}", e);
                    Vec::new()
                }
            },
        };

        raw.into_iter()
            .map(|c| TestCase::new(c.input, c.output))
            .collect()
    }
}

impl DatasetRow {
    fn into_problem(self, index: usize) -> Problem {
        let id = match self.question_id.is_empty() {
            true => format!("problem_{index}"),
            false => self.question_id,
        };

        Problem {
            id,
            prompt_content: self.question_content,
            starter_code: self.starter_code.filter(|s| !s.trim().is_empty()),
            public_tests: self.public_test_cases.into_test_cases(),
            private_tests: self.private_test_cases.into_test_cases(),
        }
    }
}

/// Parse a corpus given either as JSON lines or as a single JSON array.
pub fn parse_corpus(text: &str) -> Result<Vec<Problem>, DatasetLoadError> {
    if text.trim_start().starts_with('[') {
        let rows: Vec<DatasetRow> = serde_json::from_str(text)?;
        return Ok(rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| row.into_problem(i))
            .collect());
    }

    let mut problems = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: DatasetRow = serde_json::from_str(line).map_err(|source| DatasetLoadError::Row {
            line: line_idx + 1,
            source,
        })?;
        problems.push(row.into_problem(problems.len()));
    }
    Ok(problems)
}

// =============================================================================
// Sampling
// =============================================================================

/// Caches the corpus for the sampler's lifetime and hands out reproducible
/// subsets of it.
pub struct ProblemSampler {
    source: Arc<dyn DatasetSource>,
    corpus: OnceCell<Arc<[Arc<Problem>]>>,
}

impl ProblemSampler {
    pub fn new(source: Arc<dyn DatasetSource>) -> Self {
        Self {
            source,
            corpus: OnceCell::new(),
        }
    }

    pub async fn corpus(&self) -> Result<Arc<[Arc<Problem>]>, DatasetLoadError> {
        let corpus = self
            .corpus
            .get_or_try_init(|| async {
                let problems = self.source.fetch().await?;
                tracing::info!("Loaded {} problems", problems.len());
                Ok::<_, DatasetLoadError>(problems.into_iter().map(Arc::new).collect())
            })
            .await?;
        Ok(Arc::clone(corpus))
    }

    pub async fn load_problems(
        &self,
        sample_size: i64,
    ) -> Result<Vec<Arc<Problem>>, DatasetLoadError> {
        let corpus = self.corpus().await?;
        Ok(sample_problems(&corpus, sample_size))
    }
}

/// Full corpus in original order unless `0 < sample_size < len`, in which case
/// the first `sample_size` problems of a fixed-seed shuffle.
pub fn sample_problems(corpus: &[Arc<Problem>], sample_size: i64) -> Vec<Arc<Problem>> {
    let wanted = match usize::try_from(sample_size) {
        Ok(n) if n > 0 && n < corpus.len() => n,
        _ => return corpus.to_vec(),
    };

    let mut rng = ChaCha8Rng::seed_from_u64(FIXED_RANDOM_SEED);
    let mut shuffled = corpus.to_vec();
    shuffled.shuffle(&mut rng);
    shuffled.truncate(wanted);

    tracing::info!("Sampled {} problems (seed={})", wanted, FIXED_RANDOM_SEED);
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource {
        problems: Vec<Problem>,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn with_ids(count: usize) -> Self {
            let problems = (0..count)
                .map(|i| Problem {
                    id: format!("q{i:03}"),
                    prompt_content: format!("problem {i}"),
                    starter_code: None,
                    public_tests: Vec::new(),
                    private_tests: Vec::new(),
                })
                .collect();
            Self {
                problems,
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DatasetSource for StaticSource {
        async fn fetch(&self) -> Result<Vec<Problem>, DatasetLoadError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.problems.clone())
        }
    }

    fn ids(problems: &[Arc<Problem>]) -> Vec<String> {
        problems.iter().map(|p| p.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_same_sample_size_gives_same_sequence() {
        let sampler = ProblemSampler::new(Arc::new(StaticSource::with_ids(50)));

        let first = ids(&sampler.load_problems(10).await.unwrap());
        let second = ids(&sampler.load_problems(10).await.unwrap());

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);

        let other = ProblemSampler::new(Arc::new(StaticSource::with_ids(50)));
        assert_eq!(ids(&other.load_problems(10).await.unwrap()), first);
    }

    #[tokio::test]
    async fn test_full_runs_keep_original_order() {
        let sampler = ProblemSampler::new(Arc::new(StaticSource::with_ids(20)));
        let original: Vec<String> = (0..20).map(|i| format!("q{i:03}")).collect();

        assert_eq!(ids(&sampler.load_problems(0).await.unwrap()), original);
        assert_eq!(ids(&sampler.load_problems(20).await.unwrap()), original);
        assert_eq!(ids(&sampler.load_problems(500).await.unwrap()), original);
        assert_eq!(ids(&sampler.load_problems(-3).await.unwrap()), original);
    }

    #[tokio::test]
    async fn test_sample_is_shuffled_subset_without_duplicates() {
        let sampler = ProblemSampler::new(Arc::new(StaticSource::with_ids(40)));
        let sample = ids(&sampler.load_problems(15).await.unwrap());

        let mut unique = sample.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 15);

        let prefix: Vec<String> = (0..15).map(|i| format!("q{i:03}")).collect();
        assert_ne!(sample, prefix);
    }

    #[tokio::test]
    async fn test_corpus_is_fetched_once() {
        let source = Arc::new(StaticSource::with_ids(5));
        let sampler = ProblemSampler::new(source.clone());

        sampler.load_problems(2).await.unwrap();
        sampler.load_problems(0).await.unwrap();
        sampler.corpus().await.unwrap();

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_parse_rows_with_encoded_test_cases() {
        let text = concat!(
            r#"{"question_id":"abc301_a","question_content":"Sum two ints","starter_code":"","public_test_cases":"[{\"input\": \"1 2\\n\", \"output\": \"3\\n\", \"testtype\": \"stdin\"}]","private_test_cases":"not json"}"#,
            "\n\n",
            r#"{"question_id":"lc_1","question_content":"Two sum","starter_code":"class Solution:\n    pass","public_test_cases":[{"input":"[1]","output":"[0]"}]}"#,
            "\n",
        );

        let problems = parse_corpus(text).unwrap();
        assert_eq!(problems.len(), 2);

        assert_eq!(problems[0].id, "abc301_a");
        assert_eq!(problems[0].starter_code, None);
        assert_eq!(problems[0].public_tests, vec![TestCase::new("1 2\n", "3\n")]);
        assert!(problems[0].private_tests.is_empty());

        assert_eq!(problems[1].starter_code.as_deref(), Some("class Solution:\n    pass"));
        assert_eq!(problems[1].public_tests, vec![TestCase::new("[1]", "[0]")]);
    }

    #[test]
    fn test_parse_json_array_and_missing_fields() {
        let problems = parse_corpus(r#"[{"question_content": "x"}, {"question_id": "b"}]"#).unwrap();
        assert_eq!(problems[0].id, "problem_0");
        assert_eq!(problems[1].id, "b");
        assert_eq!(problems[1].prompt_content, "");
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let err = parse_corpus("{\"question_id\": \"a\"}\nnot-json\n").unwrap_err();
        assert!(matches!(err, DatasetLoadError::Row { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_jsonl_source_reads_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"question_id": "one", "question_content": "c"}}"#).unwrap();
        writeln!(file, r#"{{"question_id": "two", "question_content": "d"}}"#).unwrap();

        let source = JsonlDatasetSource::new(file.path().to_string_lossy());
        let problems = source.fetch().await.unwrap();
        assert_eq!(problems.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), ["one", "two"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_load_error() {
        let source = JsonlDatasetSource::new("/nonexistent/corpus.jsonl");
        let sampler = ProblemSampler::new(Arc::new(source));
        assert!(matches!(sampler.load_problems(3).await, Err(DatasetLoadError::Io(_))));
    }
}
