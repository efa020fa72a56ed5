//! Relational layout of the build database artifact.
//!
//! Table and column names are part of the artifact format that downstream
//! readers query, so they keep the established PascalCase naming:
//! - `Builds` and `Projects` hold the lifecycle entities
//! - `PropertyDefinitions` / `Properties` intern names and values once
//! - `BuildProperties` / `ProjectProperties` associate them with owners
//! - `SchemaVersion` carries the layout revision for forward compatibility
//!
//! Timestamps are microseconds since the Unix epoch.

/// Migration v1: builds, interned properties, environment associations.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS SchemaVersion (
    Id INTEGER PRIMARY KEY CHECK (Id = 1),
    Version INTEGER NOT NULL
);

INSERT OR IGNORE INTO SchemaVersion (Id, Version) VALUES (1, 1);

CREATE TABLE IF NOT EXISTS Builds (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    StartTime INTEGER NOT NULL,
    EndTime INTEGER,
    Succeeded INTEGER NOT NULL DEFAULT 0 CHECK (Succeeded IN (0, 1))
);

CREATE TABLE IF NOT EXISTS PropertyDefinitions (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL,
    IsMetadata INTEGER NOT NULL CHECK (IsMetadata IN (0, 1)),
    UNIQUE (Name, IsMetadata)
);

CREATE TABLE IF NOT EXISTS Properties (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    DefinitionId INTEGER NOT NULL REFERENCES PropertyDefinitions(Id) ON DELETE CASCADE,
    Value TEXT NOT NULL,
    UNIQUE (DefinitionId, Value)
);

CREATE TABLE IF NOT EXISTS BuildProperties (
    BuildId INTEGER NOT NULL REFERENCES Builds(Id) ON DELETE CASCADE,
    PropertyId INTEGER NOT NULL REFERENCES Properties(Id) ON DELETE CASCADE,
    PRIMARY KEY (BuildId, PropertyId)
);

CREATE INDEX IF NOT EXISTS IX_BuildProperties_PropertyId
    ON BuildProperties(PropertyId);
";

/// Migration v2: projects, their parent links and property associations.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS Projects (
    Id INTEGER PRIMARY KEY AUTOINCREMENT,
    BuildId INTEGER NOT NULL REFERENCES Builds(Id) ON DELETE CASCADE,
    ProjectContextId INTEGER NOT NULL,
    ParentId INTEGER REFERENCES Projects(Id) ON DELETE SET NULL,
    StartTime INTEGER,
    EndTime INTEGER,
    Targets TEXT,
    ToolsVersion TEXT,
    ProjectFile TEXT,
    UNIQUE (BuildId, ProjectContextId),
    CHECK (ParentId IS NULL OR ParentId <> Id)
);

CREATE INDEX IF NOT EXISTS IX_Projects_ParentId
    ON Projects(ParentId);

CREATE TABLE IF NOT EXISTS ProjectProperties (
    ProjectId INTEGER NOT NULL REFERENCES Projects(Id) ON DELETE CASCADE,
    PropertyId INTEGER NOT NULL REFERENCES Properties(Id) ON DELETE CASCADE,
    Global INTEGER NOT NULL CHECK (Global IN (0, 1)),
    PRIMARY KEY (ProjectId, PropertyId, Global)
);

CREATE INDEX IF NOT EXISTS IX_ProjectProperties_PropertyId
    ON ProjectProperties(PropertyId);
";

/// Tables every artifact must contain.
pub const REQUIRED_TABLES: &[&str] = &[
    "SchemaVersion",
    "Builds",
    "PropertyDefinitions",
    "Properties",
    "BuildProperties",
    "Projects",
    "ProjectProperties",
];

/// Secondary indexes backing association lookups.
pub const REQUIRED_INDEXES: &[&str] = &[
    "IX_BuildProperties_PropertyId",
    "IX_Projects_ParentId",
    "IX_ProjectProperties_PropertyId",
];
