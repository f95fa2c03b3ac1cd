use rusqlite::Connection;

/// Create every table and index. Safe to run on each open.
pub(super) fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            readable_text TEXT NOT NULL DEFAULT '',
            timestamp INTEGER NOT NULL,
            keywords TEXT NOT NULL DEFAULT '[]',
            domain TEXT NOT NULL DEFAULT '',
            favicon TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_nodes_domain ON nodes(domain);
        CREATE INDEX IF NOT EXISTS idx_nodes_timestamp ON nodes(timestamp);
        CREATE INDEX IF NOT EXISTS idx_nodes_url ON nodes(url);

        CREATE TABLE IF NOT EXISTS embeddings (
            node_id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            model TEXT NOT NULL,
            timestamp INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS edges (
            from_node TEXT NOT NULL,
            to_node TEXT NOT NULL,
            strength REAL NOT NULL,
            timestamp INTEGER NOT NULL,
            PRIMARY KEY (from_node, to_node)
        );

        CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_node);

        CREATE TABLE IF NOT EXISTS clusters (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            node_ids TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS privacy_rules (
            id TEXT PRIMARY KEY,
            rule_type TEXT NOT NULL,
            value TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at INTEGER NOT NULL
        );
        ",
    )
}

/// Tables emptied by a full wipe.
pub(super) const ALL_TABLES: &[&str] = &[
    "nodes",
    "embeddings",
    "edges",
    "clusters",
    "settings",
    "privacy_rules",
];
