//! Stable business keys for scheduled jobs.

use std::fmt::Display;

use super::status::JobType;

/// Build the key identifying "the job of type `job_type` for this entity".
///
/// The format is `<job_type>:<entity_kind>:<entity_id>`, e.g.
/// `publish_post:article:0190c5d2-…`.
pub fn entity_job_key(job_type: JobType, entity_kind: &str, entity_id: impl Display) -> String {
    format!("{job_type}:{entity_kind}:{entity_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_key_format() {
        let id = Uuid::nil();
        assert_eq!(
            entity_job_key(JobType::PublishPost, "article", id),
            "publish_post:article:00000000-0000-0000-0000-000000000000"
        );
    }
}
