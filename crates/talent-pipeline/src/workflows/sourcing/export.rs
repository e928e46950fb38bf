use std::io::Write;

use serde::Serialize;

use super::domain::JobGroup;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    job_title: &'a str,
    rank: Option<u32>,
    name: &'a str,
    candidate_link: &'a str,
    contacted: bool,
    review: Option<u8>,
    hired: bool,
    notes: String,
}

/// Write one CSV row per saved candidate, groups and candidates in the given
/// order. Notes are joined with `"; "` so each record stays on one line.
pub fn write_groups_csv<W: Write>(groups: &[JobGroup], writer: W) -> Result<(), csv::Error> {
    let mut csv = csv::Writer::from_writer(writer);
    for group in groups {
        for candidate in &group.candidates {
            csv.serialize(ExportRow {
                job_title: &group.title,
                rank: candidate.rank,
                name: candidate.name.as_deref().unwrap_or_default(),
                candidate_link: &candidate.candidate_link,
                contacted: candidate.contacted,
                review: candidate.review,
                hired: candidate.hired,
                notes: candidate.notes.bullets().join("; "),
            })?;
        }
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::sourcing::domain::{JobId, Notes, SavedCandidate};

    fn record(link: &str, rank: u32) -> SavedCandidate {
        SavedCandidate {
            job_id: JobId::from("job-1"),
            candidate_link: link.to_string(),
            name: Some("Grace Hopper".to_string()),
            job_title: Some("Compiler Engineer".to_string()),
            rank: Some(rank),
            notes: Notes::from_bullets(["strong systems", "ask about COBOL"]).expect("valid notes"),
            contacted: true,
            review: Some(4),
            email: None,
            linkedin: None,
            match_score: Some(91),
            reasoning: None,
            hired: false,
            resume_file_id: None,
        }
    }

    #[test]
    fn writes_header_and_one_row_per_candidate() {
        let groups = vec![JobGroup {
            title: "Compiler Engineer".to_string(),
            candidates: vec![record("https://example.com/grace", 0)],
        }];
        let mut buffer = Vec::new();

        write_groups_csv(&groups, &mut buffer).expect("csv written");

        let output = String::from_utf8(buffer).expect("utf8");
        let mut lines = output.lines();
        assert_eq!(
            lines.next(),
            Some("job_title,rank,name,candidate_link,contacted,review,hired,notes")
        );
        assert_eq!(
            lines.next(),
            Some("Compiler Engineer,0,Grace Hopper,https://example.com/grace,true,4,false,strong systems; ask about COBOL")
        );
        assert_eq!(lines.next(), None);
    }
}
