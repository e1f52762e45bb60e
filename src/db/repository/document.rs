use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{parse_stored_datetime, parse_stored_uuid, DATETIME_FMT};
use crate::db::DatabaseError;
use crate::models::{Document, Page};

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, filename, upload_date, total_pages)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            doc.id.to_string(),
            doc.filename,
            doc.upload_date.format(DATETIME_FMT).to_string(),
            doc.total_pages,
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Document, DatabaseError> {
    conn.query_row(
        "SELECT id, filename, upload_date, total_pages FROM documents WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "document".into(),
        id: id.to_string(),
    })
    .and_then(|(id, filename, upload_date, total_pages)| {
        Ok(Document {
            id: parse_stored_uuid(&id)?,
            filename,
            upload_date: parse_stored_datetime(&upload_date)?,
            total_pages,
        })
    })
}

pub fn list_documents(conn: &Connection) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, upload_date, total_pages
         FROM documents ORDER BY upload_date DESC",
    )?;

    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (id, filename, upload_date, total_pages) = row?;
        docs.push(Document {
            id: parse_stored_uuid(&id)?,
            filename,
            upload_date: parse_stored_datetime(&upload_date)?,
            total_pages,
        });
    }
    Ok(docs)
}

pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Insert one page row. Each call commits independently; the pipeline
/// relies on this to bound data loss to in-flight pages on a crash.
pub fn insert_page(conn: &Connection, page: &Page) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pages (id, document_id, page_number, content, image_data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            page.id.to_string(),
            page.document_id.to_string(),
            page.page_number,
            page.content,
            page.image_data,
        ],
    )?;
    Ok(())
}

/// All pages of a document, ordered by page number.
pub fn get_pages(conn: &Connection, document_id: &Uuid) -> Result<Vec<Page>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, page_number, content, image_data
         FROM pages WHERE document_id = ?1 ORDER BY page_number ASC",
    )?;

    let rows = stmt.query_map(params![document_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, Option<String>>(4)?,
        ))
    })?;

    let mut pages = Vec::new();
    for row in rows {
        let (id, doc_id, page_number, content, image_data) = row?;
        pages.push(Page {
            id: parse_stored_uuid(&id)?,
            document_id: parse_stored_uuid(&doc_id)?,
            page_number,
            content,
            image_data,
        });
    }
    Ok(pages)
}

pub fn get_page(
    conn: &Connection,
    document_id: &Uuid,
    page_number: i64,
) -> Result<Page, DatabaseError> {
    conn.query_row(
        "SELECT id, document_id, page_number, content, image_data
         FROM pages WHERE document_id = ?1 AND page_number = ?2",
        params![document_id.to_string(), page_number],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        },
    )
    .optional()?
    .ok_or_else(|| DatabaseError::NotFound {
        entity_type: "page".into(),
        id: format!("{document_id}/{page_number}"),
    })
    .and_then(|(id, doc_id, page_number, content, image_data)| {
        Ok(Page {
            id: parse_stored_uuid(&id)?,
            document_id: parse_stored_uuid(&doc_id)?,
            page_number,
            content,
            image_data,
        })
    })
}
