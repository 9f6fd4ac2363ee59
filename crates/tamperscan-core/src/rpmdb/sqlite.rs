//! `rpmdb.sqlite` backend.

use std::path::Path;

use rusqlite::Connection;
use rusqlite::OpenFlags;

use super::RpmDbError;

pub(super) fn open(path: &Path, writable: bool) -> Result<Connection, RpmDbError> {
    let access = if writable {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    } else {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    };
    let conn = Connection::open_with_flags(path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    Ok(conn)
}

pub(super) fn read_blobs(conn: &Connection) -> Result<Vec<Vec<u8>>, RpmDbError> {
    let mut stmt = conn.prepare("SELECT blob FROM Packages ORDER BY hnum")?;
    let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
    let blobs = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(blobs)
}
