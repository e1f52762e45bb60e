use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_stored_date_opt, parse_stored_datetime, parse_stored_uuid, DATETIME_FMT, DATE_FMT};
use crate::db::DatabaseError;
use crate::models::{DocumentSummary, SummaryExtraction};

/// Load a document's summary with its extractions, if any.
pub fn get_summary(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Option<(DocumentSummary, Vec<SummaryExtraction>)>, DatabaseError> {
    let summary = conn
        .query_row(
            "SELECT id, document_id, analysis_date
             FROM document_summaries WHERE document_id = ?1",
            params![document_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((id, doc_id, analysis_date)) = summary else {
        return Ok(None);
    };

    let summary = DocumentSummary {
        id: parse_stored_uuid(&id)?,
        document_id: parse_stored_uuid(&doc_id)?,
        analysis_date: parse_stored_datetime(&analysis_date)?,
    };

    let extractions = get_extractions(conn, &summary.id)?;
    Ok(Some((summary, extractions)))
}

/// Insert a summary and its extractions in one transaction, enforcing the
/// at-most-once invariant the same way as prescription analyses.
pub fn insert_summary(
    conn: &mut Connection,
    summary: &DocumentSummary,
    extractions: &[SummaryExtraction],
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;

    let existing: i64 = tx.query_row(
        "SELECT COUNT(*) FROM document_summaries WHERE document_id = ?1",
        params![summary.document_id.to_string()],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "summary already exists for document {}",
            summary.document_id
        )));
    }

    tx.execute(
        "INSERT INTO document_summaries (id, document_id, analysis_date)
         VALUES (?1, ?2, ?3)",
        params![
            summary.id.to_string(),
            summary.document_id.to_string(),
            summary.analysis_date.format(DATETIME_FMT).to_string(),
        ],
    )?;

    for ext in extractions {
        tx.execute(
            "INSERT INTO summary_extractions (id, summary_id, category, field, value,
             page_number, associated_date, extraction_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ext.id.to_string(),
                ext.summary_id.to_string(),
                ext.category,
                ext.field,
                ext.value,
                ext.page_number,
                ext.associated_date.map(|d| d.format(DATE_FMT).to_string()),
                ext.extraction_date.format(DATETIME_FMT).to_string(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Delete a document's summary (extractions cascade). Returns whether a
/// summary existed.
pub fn delete_summary(conn: &Connection, document_id: &Uuid) -> Result<bool, DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM document_summaries WHERE document_id = ?1",
        params![document_id.to_string()],
    )?;
    Ok(affected > 0)
}

fn get_extractions(
    conn: &Connection,
    summary_id: &Uuid,
) -> Result<Vec<SummaryExtraction>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, summary_id, category, field, value, page_number,
         associated_date, extraction_date
         FROM summary_extractions WHERE summary_id = ?1 ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![summary_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, Option<i64>>(5)?,
            row.get::<_, Option<String>>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut extractions = Vec::new();
    for row in rows {
        let (id, summary_id, category, field, value, page_number, associated_date, extraction_date) =
            row?;
        extractions.push(SummaryExtraction {
            id: parse_stored_uuid(&id)?,
            summary_id: parse_stored_uuid(&summary_id)?,
            category,
            field,
            value,
            page_number,
            associated_date: parse_stored_date_opt(associated_date),
            extraction_date: parse_stored_datetime(&extraction_date)?,
        });
    }
    Ok(extractions)
}
