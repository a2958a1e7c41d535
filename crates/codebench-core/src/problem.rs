use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

impl TestCase {
    pub fn new(input: impl Into<String>, expected_output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected_output: expected_output.into(),
        }
    }
}

/// A benchmark problem as loaded from the dataset corpus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    pub id: String,
    pub prompt_content: String,
    #[serde(default)]
    pub starter_code: Option<String>,
    #[serde(default)]
    pub public_tests: Vec<TestCase>,
    #[serde(default)]
    pub private_tests: Vec<TestCase>,
}

impl Problem {
    /// Public tests followed by private tests, in dataset order.
    pub fn test_cases(&self) -> Vec<TestCase> {
        self.public_tests
            .iter()
            .chain(self.private_tests.iter())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_keep_public_before_private() {
        let problem = Problem {
            id: "p1".into(),
            prompt_content: "add".into(),
            starter_code: None,
            public_tests: vec![TestCase::new("1", "a")],
            private_tests: vec![TestCase::new("2", "b"), TestCase::new("3", "c")],
        };

        let inputs: Vec<_> = problem.test_cases().into_iter().map(|t| t.input).collect();
        assert_eq!(inputs, vec!["1", "2", "3"]);
    }
}
