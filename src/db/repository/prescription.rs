use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_stored_date_opt, parse_stored_datetime, parse_stored_uuid, DATETIME_FMT, DATE_FMT};
use crate::db::DatabaseError;
use crate::models::{Medication, PrescriptionAnalysis};

/// Load a document's prescription analysis with its medications, if any.
pub fn get_prescription(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Option<(PrescriptionAnalysis, Vec<Medication>)>, DatabaseError> {
    let analysis = conn
        .query_row(
            "SELECT id, document_id, analysis_date
             FROM prescription_analyses WHERE document_id = ?1",
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

    let Some((id, doc_id, analysis_date)) = analysis else {
        return Ok(None);
    };

    let analysis = PrescriptionAnalysis {
        id: parse_stored_uuid(&id)?,
        document_id: parse_stored_uuid(&doc_id)?,
        analysis_date: parse_stored_datetime(&analysis_date)?,
    };

    let medications = get_medications(conn, &analysis.id)?;
    Ok(Some((analysis, medications)))
}

/// Insert an analysis and its medications in one transaction.
///
/// Re-checks the at-most-once invariant inside the transaction so two
/// concurrent callers cannot both create an analysis; the UNIQUE
/// constraint on document_id backstops the check.
pub fn insert_prescription(
    conn: &mut Connection,
    analysis: &PrescriptionAnalysis,
    medications: &[Medication],
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;

    let existing: i64 = tx.query_row(
        "SELECT COUNT(*) FROM prescription_analyses WHERE document_id = ?1",
        params![analysis.document_id.to_string()],
        |row| row.get(0),
    )?;
    if existing > 0 {
        return Err(DatabaseError::ConstraintViolation(format!(
            "prescription analysis already exists for document {}",
            analysis.document_id
        )));
    }

    tx.execute(
        "INSERT INTO prescription_analyses (id, document_id, analysis_date)
         VALUES (?1, ?2, ?3)",
        params![
            analysis.id.to_string(),
            analysis.document_id.to_string(),
            analysis.analysis_date.format(DATETIME_FMT).to_string(),
        ],
    )?;

    for med in medications {
        tx.execute(
            "INSERT INTO medications (id, analysis_id, name, dosage, frequency, start_date,
             duration, duration_raw, end_date, instructions, page_number)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                med.id.to_string(),
                med.analysis_id.to_string(),
                med.name,
                med.dosage,
                med.frequency,
                med.start_date.map(|d| d.format(DATE_FMT).to_string()),
                med.duration,
                med.duration_raw,
                med.end_date.map(|d| d.format(DATE_FMT).to_string()),
                med.instructions,
                med.page_number,
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

fn get_medications(
    conn: &Connection,
    analysis_id: &Uuid,
) -> Result<Vec<Medication>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, analysis_id, name, dosage, frequency, start_date, duration,
         duration_raw, end_date, instructions, page_number
         FROM medications WHERE analysis_id = ?1 ORDER BY rowid ASC",
    )?;

    let rows = stmt.query_map(params![analysis_id.to_string()], |row| {
        Ok(MedicationRow {
            id: row.get(0)?,
            analysis_id: row.get(1)?,
            name: row.get(2)?,
            dosage: row.get(3)?,
            frequency: row.get(4)?,
            start_date: row.get(5)?,
            duration: row.get(6)?,
            duration_raw: row.get(7)?,
            end_date: row.get(8)?,
            instructions: row.get(9)?,
            page_number: row.get(10)?,
        })
    })?;

    let mut meds = Vec::new();
    for row in rows {
        let row = row?;
        meds.push(Medication {
            id: parse_stored_uuid(&row.id)?,
            analysis_id: parse_stored_uuid(&row.analysis_id)?,
            name: row.name,
            dosage: row.dosage,
            frequency: row.frequency,
            start_date: parse_stored_date_opt(row.start_date),
            duration: row.duration,
            duration_raw: row.duration_raw,
            end_date: parse_stored_date_opt(row.end_date),
            instructions: row.instructions,
            page_number: row.page_number,
        });
    }
    Ok(meds)
}

struct MedicationRow {
    id: String,
    analysis_id: String,
    name: String,
    dosage: Option<String>,
    frequency: Option<String>,
    start_date: Option<String>,
    duration: Option<String>,
    duration_raw: Option<String>,
    end_date: Option<String>,
    instructions: Option<String>,
    page_number: Option<i64>,
}
