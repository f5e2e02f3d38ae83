//! SQLite-backed implementation of the persistence gateway.

use crate::{NodeId, NodeRecord, PersistError, PersistenceGateway, RecordKind, Storage};
use log::info;
use rusqlite::params;

/// Gateway persisting taxonomy nodes into a [`Storage`] database.
pub struct SqliteGateway {
    storage: Storage,
}

impl SqliteGateway {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Attaches a tag to a tour. Duplicate references are ignored.
    pub fn add_tour_reference(&mut self, tour_id: i64, tag_id: NodeId) -> Result<(), PersistError> {
        self.storage.connection().execute(
            "INSERT OR IGNORE INTO tour_tag_refs (tour_id, tag_id) VALUES (?1, ?2)",
            params![tour_id, tag_id.0],
        )?;
        Ok(())
    }

    /// Number of tours referencing `tag_id`.
    pub fn tour_reference_count(&self, tag_id: NodeId) -> Result<usize, PersistError> {
        let count: i64 = self.storage.connection().query_row(
            "SELECT COUNT(*) FROM tour_tag_refs WHERE tag_id = ?1",
            params![tag_id.0],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn save(&mut self, record: &NodeRecord) -> Result<NodeId, PersistError> {
        match record.id {
            Some(id) => {
                let changed = self.storage.connection().execute(
                    "UPDATE taxonomy_nodes
                     SET kind = ?1, name = ?2, notes = ?3, parent_id = ?4, modified_at = ?5
                     WHERE id = ?6",
                    params![
                        record.kind.as_str(),
                        record.name,
                        record.notes,
                        record.parent_id.map(|p| p.0),
                        record.modified_at,
                        id.0,
                    ],
                )?;
                if changed == 0 {
                    return Err(PersistError::Rejected(format!(
                        "node {id} does not exist"
                    )));
                }
                Ok(id)
            }
            None => {
                self.storage.connection().execute(
                    "INSERT INTO taxonomy_nodes (kind, name, notes, parent_id, created_at, modified_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.kind.as_str(),
                        record.name,
                        record.notes,
                        record.parent_id.map(|p| p.0),
                        record.created_at,
                        record.modified_at,
                    ],
                )?;
                Ok(NodeId(self.storage.connection().last_insert_rowid()))
            }
        }
    }

    fn delete(&mut self, id: NodeId) -> Result<(), PersistError> {
        let tx = self.storage.connection_mut().transaction()?;
        tx.execute(
            "DELETE FROM tour_tag_refs WHERE tag_id = ?1",
            params![id.0],
        )?;
        let changed = tx.execute("DELETE FROM taxonomy_nodes WHERE id = ?1", params![id.0])?;
        if changed == 0 {
            return Err(PersistError::Rejected(format!("node {id} does not exist")));
        }
        tx.commit()?;
        Ok(())
    }

    fn clear_tour_references(&mut self, tag_id: NodeId) -> Result<(), PersistError> {
        let cleared = self.storage.connection().execute(
            "DELETE FROM tour_tag_refs WHERE tag_id = ?1",
            params![tag_id.0],
        )?;
        info!("cleared {cleared} tour references of tag {tag_id}");
        Ok(())
    }

    fn reset_structure(&mut self) -> Result<(), PersistError> {
        let flattened = self.storage.connection().execute(
            "UPDATE taxonomy_nodes SET parent_id = NULL WHERE parent_id IS NOT NULL",
            [],
        )?;
        info!("reset taxonomy structure, {flattened} nodes moved to root");
        Ok(())
    }

    fn load_all(&mut self) -> Result<Vec<NodeRecord>, PersistError> {
        let mut stmt = self.storage.connection().prepare(
            "SELECT id, kind, name, notes, parent_id, created_at, modified_at
             FROM taxonomy_nodes ORDER BY id",
        )?;
        let records = stmt
            .query_map([], |row| {
                let kind: String = row.get(1)?;
                Ok(NodeRecord {
                    id: Some(NodeId(row.get(0)?)),
                    kind: RecordKind::parse(&kind).unwrap_or(RecordKind::Tag),
                    name: row.get(2)?,
                    notes: row.get(3)?,
                    parent_id: row.get::<_, Option<i64>>(4)?.map(NodeId),
                    created_at: row.get(5)?,
                    modified_at: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> SqliteGateway {
        SqliteGateway::new(Storage::in_memory().unwrap())
    }

    fn record(kind: RecordKind, name: &str, parent_id: Option<NodeId>) -> NodeRecord {
        NodeRecord {
            id: None,
            kind,
            name: name.to_string(),
            notes: String::new(),
            parent_id,
            created_at: 100,
            modified_at: 100,
        }
    }

    #[test]
    fn test_save_assigns_id_and_load_round_trips() {
        let mut gw = gateway();
        let sport = gw.save(&record(RecordKind::Category, "Sport", None)).unwrap();
        let running = gw
            .save(&record(RecordKind::Tag, "Running", Some(sport)))
            .unwrap();
        assert_ne!(sport, running);

        let loaded = gw.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        let running_row = loaded.iter().find(|r| r.name == "Running").unwrap();
        assert_eq!(running_row.parent_id, Some(sport));
        assert_eq!(running_row.kind, RecordKind::Tag);
    }

    #[test]
    fn test_save_existing_updates_in_place() {
        let mut gw = gateway();
        let id = gw.save(&record(RecordKind::Tag, "Running", None)).unwrap();

        let mut renamed = record(RecordKind::Tag, "Trail Running", None);
        renamed.id = Some(id);
        let echoed = gw.save(&renamed).unwrap();
        assert_eq!(echoed, id);

        let loaded = gw.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Trail Running");
    }

    #[test]
    fn test_save_unknown_id_is_rejected() {
        let mut gw = gateway();
        let mut phantom = record(RecordKind::Tag, "Ghost", None);
        phantom.id = Some(NodeId(999));
        assert!(matches!(
            gw.save(&phantom),
            Err(PersistError::Rejected(_))
        ));
    }

    #[test]
    fn test_delete_removes_node_and_references() {
        let mut gw = gateway();
        let tag = gw.save(&record(RecordKind::Tag, "Running", None)).unwrap();
        gw.add_tour_reference(1, tag).unwrap();
        gw.add_tour_reference(2, tag).unwrap();
        assert_eq!(gw.tour_reference_count(tag).unwrap(), 2);

        gw.delete(tag).unwrap();
        assert_eq!(gw.tour_reference_count(tag).unwrap(), 0);
        assert!(gw.load_all().unwrap().is_empty());

        assert!(matches!(gw.delete(tag), Err(PersistError::Rejected(_))));
    }

    #[test]
    fn test_clear_tour_references_keeps_node() {
        let mut gw = gateway();
        let tag = gw.save(&record(RecordKind::Tag, "Running", None)).unwrap();
        gw.add_tour_reference(7, tag).unwrap();

        gw.clear_tour_references(tag).unwrap();

        assert_eq!(gw.tour_reference_count(tag).unwrap(), 0);
        assert_eq!(gw.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_structure_flattens_forest_but_keeps_tour_refs() {
        let mut gw = gateway();
        let sport = gw.save(&record(RecordKind::Category, "Sport", None)).unwrap();
        let running = gw
            .save(&record(RecordKind::Tag, "Running", Some(sport)))
            .unwrap();
        gw.add_tour_reference(1, running).unwrap();

        gw.reset_structure().unwrap();

        let loaded = gw.load_all().unwrap();
        assert!(loaded.iter().all(|r| r.parent_id.is_none()));
        assert_eq!(gw.tour_reference_count(running).unwrap(), 1);
    }
}
