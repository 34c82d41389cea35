//! Push webhook payload structures

use serde::Deserialize;

/// The subset of a GitHub "push" event the mailer reads.
#[derive(Debug, Clone, Deserialize)]
pub struct PushPayload {
    /// Full reference, e.g. `refs/heads/main`
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default)]
    pub commits: Vec<Commit>,
    pub pusher: Option<Identity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Commit {
    pub id: String,
    pub url: String,
    /// First line is the subject, the rest is the body
    pub message: String,
    pub timestamp: String,
    pub author: Identity,
    pub committer: Identity,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Identity {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl PushPayload {
    /// Branch name as the last `/`-separated segment of `ref`.
    pub fn branch_name(&self) -> Option<&str> {
        self.git_ref
            .as_deref()
            .and_then(|git_ref| git_ref.rsplit('/').next())
    }
}

impl Commit {
    /// URL serving the unified diff of this commit.
    pub fn diff_url(&self) -> String {
        format!("{}.diff", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_github_push_shape() {
        let payload: PushPayload = serde_json::from_value(json!({
            "ref": "refs/heads/3.6",
            "before": "0000000",
            "after": "2d420b3",
            "commits": [{
                "id": "2d420b3",
                "url": "https://github.com/python/cpython/commit/2d420b3",
                "message": "Fix typo",
                "timestamp": "2017-02-08T15:37:50+03:00",
                "author": {"name": "A", "email": "a@example.com", "username": "a"},
                "committer": {"name": "C", "email": "c@example.com", "username": "c"},
                "added": ["new.txt"],
                "removed": [],
                "modified": ["README"]
            }],
            "pusher": {"name": "P", "email": "p@example.com"}
        }))
        .unwrap();

        assert_eq!(payload.branch_name(), Some("3.6"));
        assert_eq!(payload.commits.len(), 1);
        assert_eq!(payload.commits[0].added, vec!["new.txt".to_string()]);
        assert_eq!(payload.pusher.as_ref().map(|p| p.name.as_str()), Some("P"));
        assert_eq!(
            payload.commits[0].diff_url(),
            "https://github.com/python/cpython/commit/2d420b3.diff"
        );
    }

    #[test]
    fn test_missing_commits_defaults_to_empty() {
        let payload: PushPayload =
            serde_json::from_value(json!({"ref": "refs/heads/main"})).unwrap();
        assert!(payload.commits.is_empty());
        assert!(payload.pusher.is_none());
    }

    #[test]
    fn test_branch_name_takes_last_segment() {
        let payload: PushPayload =
            serde_json::from_value(json!({"ref": "refs/heads/feature/login"})).unwrap();
        assert_eq!(payload.branch_name(), Some("login"));

        let payload: PushPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(payload.branch_name(), None);
    }
}
