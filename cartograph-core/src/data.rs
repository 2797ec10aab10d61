use crate::graph::{GraphError, GraphStore};
use crate::model::{Action, ActionAttrs, ActionType, GraphExport, Place, PlaceAttrs};
use cartograph_explorer::{ActionDescriptor, InventorySnapshot};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Persistent graph backend. One database holds many runs; a `Database`
/// value is bound to a single run and implements the same `GraphStore`
/// contract as the in-memory backend.
///
/// Single-writer: mutation is serialized by the exploration controller,
/// concurrent writers are unsupported. Concurrent readers may open their own
/// connection and call `export`-equivalent queries; WAL mode makes that safe.
pub struct Database {
    conn: Connection,
    run_id: String,
    sequence: u64,
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Open the database and start a fresh run.
    pub fn create_run(path: &Path, root_address: &str) -> Result<Self, GraphError> {
        let conn = Self::connect(path)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO runs (id, started_at, status, root_address) VALUES (?1, ?2, 'running', ?3)",
            params![&run_id, current_timestamp(), root_address],
        )?;
        debug!(%run_id, "created exploration run");
        Ok(Database {
            conn,
            run_id,
            sequence: 0,
        })
    }

    /// Attach to the most recent run in an existing database.
    pub fn open_latest(path: &Path) -> Result<Self, GraphError> {
        let conn = Self::connect(path)?;
        let run_id: Option<String> = conn
            .query_row(
                "SELECT id FROM runs ORDER BY started_at DESC, rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let run_id = run_id.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        let sequence = Self::load_sequence(&conn, &run_id)?;
        Ok(Database {
            conn,
            run_id,
            sequence,
        })
    }

    fn connect(path: &Path) -> Result<Connection, GraphError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        Self::init_schema(&conn)?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<(), GraphError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL,
                finished_at INTEGER,
                status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'aborted')),
                root_address TEXT NOT NULL,
                termination_reason TEXT
            );

            CREATE TABLE IF NOT EXISTS places (
                run_id TEXT NOT NULL,
                id TEXT NOT NULL,
                display_address TEXT NOT NULL,
                address TEXT NOT NULL,
                depth INTEGER NOT NULL DEFAULT 0,
                discovered_at INTEGER NOT NULL,
                content_fingerprint TEXT NOT NULL,
                classification TEXT NOT NULL DEFAULT '',
                observations TEXT NOT NULL DEFAULT '[]',      -- JSON array
                available_actions TEXT NOT NULL DEFAULT '[]', -- JSON array
                inventory TEXT,                               -- JSON snapshot
                evidence TEXT NOT NULL DEFAULT '[]',          -- JSON array
                PRIMARY KEY (run_id, id),
                FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_places_run ON places(run_id);
            CREATE INDEX IF NOT EXISTS idx_places_discovered ON places(run_id, discovered_at);

            CREATE TABLE IF NOT EXISTS actions (
                run_id TEXT NOT NULL,
                id TEXT NOT NULL,
                from_id TEXT NOT NULL,
                to_id TEXT NOT NULL,
                action_type TEXT NOT NULL CHECK(action_type IN (
                    'full_navigation',
                    'in_place_transition',
                    'back_navigation'
                )),
                trigger_description TEXT NOT NULL,
                expected_observation TEXT NOT NULL DEFAULT '',
                actual_observation TEXT NOT NULL DEFAULT '',
                sequence_number INTEGER NOT NULL,
                PRIMARY KEY (run_id, id),
                FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_actions_run ON actions(run_id);
            CREATE INDEX IF NOT EXISTS idx_actions_sequence ON actions(run_id, sequence_number);
            ",
        )?;
        Ok(())
    }

    fn load_sequence(conn: &Connection, run_id: &str) -> Result<u64, GraphError> {
        let place_max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(discovered_at), 0) FROM places WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        let action_max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(sequence_number), 0) FROM actions WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(place_max.max(action_max) as u64)
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn complete_run(&self, termination_reason: &str) -> Result<(), GraphError> {
        self.conn.execute(
            "UPDATE runs SET status = 'completed', finished_at = ?1, termination_reason = ?2 WHERE id = ?3",
            params![current_timestamp(), termination_reason, &self.run_id],
        )?;
        Ok(())
    }

    pub fn abort_run(&self, reason: &str) -> Result<(), GraphError> {
        self.conn.execute(
            "UPDATE runs SET status = 'aborted', finished_at = ?1, termination_reason = ?2 WHERE id = ?3",
            params![current_timestamp(), reason, &self.run_id],
        )?;
        Ok(())
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn load_place(&self, id: &str) -> Result<Option<Place>, GraphError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, display_address, address, depth, discovered_at, content_fingerprint,
                    classification, observations, available_actions, inventory, evidence
             FROM places WHERE run_id = ?1 AND id = ?2",
        )?;
        let row = stmt
            .query_row(params![&self.run_id, id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, String>(10)?,
                ))
            })
            .optional()?;

        let Some(row) = row else {
            return Ok(None);
        };
        let (
            id,
            display_address,
            address,
            depth,
            discovered_at,
            content_fingerprint,
            classification,
            observations,
            available_actions,
            inventory,
            evidence,
        ) = row;

        let inventory_snapshot: Option<InventorySnapshot> = match inventory {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        };
        Ok(Some(Place {
            id,
            display_address,
            address,
            depth: depth as usize,
            discovered_at: discovered_at as u64,
            content_fingerprint,
            classification,
            observations: serde_json::from_str(&observations)?,
            available_actions: serde_json::from_str(&available_actions)?,
            inventory_snapshot,
            evidence: serde_json::from_str(&evidence)?,
        }))
    }

    fn write_place(&self, place: &Place) -> Result<(), GraphError> {
        let inventory = place
            .inventory_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.conn.execute(
            "INSERT OR REPLACE INTO places (
                run_id, id, display_address, address, depth, discovered_at,
                content_fingerprint, classification, observations,
                available_actions, inventory, evidence
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &self.run_id,
                &place.id,
                &place.display_address,
                &place.address,
                place.depth as i64,
                place.discovered_at as i64,
                &place.content_fingerprint,
                &place.classification,
                serde_json::to_string(&place.observations)?,
                serde_json::to_string(&place.available_actions)?,
                inventory,
                serde_json::to_string(&place.evidence)?,
            ],
        )?;
        Ok(())
    }

    fn place_exists(&self, id: &str) -> Result<bool, GraphError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM places WHERE run_id = ?1 AND id = ?2",
                params![&self.run_id, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

impl GraphStore for Database {
    fn upsert_place(&mut self, attrs: PlaceAttrs) -> Result<Place, GraphError> {
        if let Some(mut place) = self.load_place(&attrs.id)? {
            place.merge(&attrs);
            self.write_place(&place)?;
            return Ok(place);
        }
        let discovered_at = self.next_sequence();
        let place = attrs.into_place(discovered_at);
        self.write_place(&place)?;
        Ok(place)
    }

    fn add_action(&mut self, attrs: ActionAttrs) -> Result<Action, GraphError> {
        if !self.place_exists(&attrs.from_id)? {
            return Err(GraphError::UnknownPlace(attrs.from_id));
        }
        if !self.place_exists(&attrs.to_id)? {
            return Err(GraphError::UnknownPlace(attrs.to_id));
        }

        let sequence_number = self.next_sequence();
        let action = Action {
            id: format!("{} -> {} @{}", attrs.from_id, attrs.to_id, sequence_number),
            from_id: attrs.from_id,
            to_id: attrs.to_id,
            action_type: attrs.action_type,
            trigger_description: attrs.trigger_description,
            expected_observation: attrs.expected_observation,
            actual_observation: attrs.actual_observation,
            sequence_number,
        };
        self.conn.execute(
            "INSERT INTO actions (
                run_id, id, from_id, to_id, action_type, trigger_description,
                expected_observation, actual_observation, sequence_number
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &self.run_id,
                &action.id,
                &action.from_id,
                &action.to_id,
                action.action_type.as_str(),
                &action.trigger_description,
                &action.expected_observation,
                &action.actual_observation,
                action.sequence_number as i64,
            ],
        )?;
        Ok(action)
    }

    fn get_place(&self, id: &str) -> Result<Option<Place>, GraphError> {
        self.load_place(id)
    }

    fn claim_action(
        &mut self,
        place_id: &str,
        locator: &str,
    ) -> Result<Option<ActionDescriptor>, GraphError> {
        let Some(mut place) = self.load_place(place_id)? else {
            return Ok(None);
        };
        let Some(pos) = place
            .available_actions
            .iter()
            .position(|a| a.locator == locator)
        else {
            return Ok(None);
        };
        let claimed = place.available_actions.remove(pos);
        self.write_place(&place)?;
        Ok(Some(claimed))
    }

    fn place_count(&self) -> Result<usize, GraphError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM places WHERE run_id = ?1",
            params![&self.run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn action_count(&self) -> Result<usize, GraphError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM actions WHERE run_id = ?1",
            params![&self.run_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn export(&self) -> Result<GraphExport, GraphError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM places WHERE run_id = ?1 ORDER BY discovered_at",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![&self.run_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(place) = self.load_place(&id)? {
                nodes.push(place);
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, from_id, to_id, action_type, trigger_description,
                    expected_observation, actual_observation, sequence_number
             FROM actions WHERE run_id = ?1 ORDER BY sequence_number",
        )?;
        let edges = stmt
            .query_map(params![&self.run_id], |row| {
                let action_type: String = row.get(3)?;
                Ok(Action {
                    id: row.get(0)?,
                    from_id: row.get(1)?,
                    to_id: row.get(2)?,
                    action_type: ActionType::from_str(&action_type)
                        .unwrap_or(ActionType::FullNavigation),
                    trigger_description: row.get(4)?,
                    expected_observation: row.get(5)?,
                    actual_observation: row.get(6)?,
                    sequence_number: row.get::<_, i64>(7)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(GraphExport { nodes, edges })
    }
}
