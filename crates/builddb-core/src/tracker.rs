//! Projects of the in-flight build, keyed by context id.
//!
//! A project row can come into existence two ways: from its own start event,
//! or as the parent named by a child whose start event arrived first. The
//! second kind is a placeholder: it has an id and a context id but no
//! details until its own start event hydrates it.
//!
//! The tracker keeps an explicit `context id -> TrackedProject` index for the
//! build so identity lookups, hydration guards and ancestry walks never go
//! back to the database.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::event::{ProjectStartedData, PropertyMap};
use crate::intern::PropertyInterner;
use crate::model::{BuildId, ContextId, ProjectId, to_micros};

/// The details a project start event supplies.
#[derive(Debug, Clone, Copy)]
pub struct ProjectDetails<'a> {
    pub start_time: DateTime<Utc>,
    pub target_names: &'a str,
    pub tools_version: Option<&'a str>,
    pub project_file: Option<&'a str>,
    pub global_properties: &'a PropertyMap,
    pub properties: &'a PropertyMap,
}

impl<'a> From<&'a ProjectStartedData> for ProjectDetails<'a> {
    fn from(data: &'a ProjectStartedData) -> Self {
        Self {
            start_time: data.timestamp,
            target_names: &data.target_names,
            tools_version: data.tools_version.as_deref(),
            project_file: data.project_file.as_deref(),
            global_properties: &data.global_properties,
            properties: &data.properties,
        }
    }
}

/// In-memory view of one project row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedProject {
    pub id: ProjectId,
    pub parent: Option<ContextId>,
    pub hydrated: bool,
    pub finished: bool,
}

/// Tracks the projects of a single build.
#[derive(Debug)]
pub struct ProjectTracker {
    build: BuildId,
    projects: HashMap<ContextId, TrackedProject>,
    placeholders: usize,
}

impl ProjectTracker {
    /// A tracker for `build`. Holding a [`BuildId`] is what guarantees the
    /// build row exists before any project references it.
    #[must_use]
    pub fn new(build: BuildId) -> Self {
        Self {
            build,
            projects: HashMap::new(),
            placeholders: 0,
        }
    }

    #[must_use]
    pub const fn build(&self) -> BuildId {
        self.build
    }

    #[must_use]
    pub fn get(&self, context_id: ContextId) -> Option<&TrackedProject> {
        self.projects.get(&context_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Number of projects first created as a parent placeholder.
    #[must_use]
    pub const fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    /// Return the project for `context_id`, creating an empty row on first
    /// sight. Repeated calls return the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn get_or_create(&mut self, conn: &Connection, context_id: ContextId) -> Result<ProjectId> {
        self.ensure(conn, context_id).map(|(id, _)| id)
    }

    fn ensure(&mut self, conn: &Connection, context_id: ContextId) -> Result<(ProjectId, bool)> {
        if let Some(project) = self.projects.get(&context_id) {
            return Ok((project.id, false));
        }

        conn.prepare_cached("INSERT INTO Projects (BuildId, ProjectContextId) VALUES (?1, ?2)")?
            .execute(params![self.build.get(), context_id.0])?;
        let id = ProjectId::from_raw(conn.last_insert_rowid());
        self.projects.insert(
            context_id,
            TrackedProject {
                id,
                parent: None,
                hydrated: false,
                finished: false,
            },
        );
        Ok((id, true))
    }

    /// Fill in a project's details and property associations.
    ///
    /// The first hydration wins: once a project has its target list this is
    /// a no-op and returns `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails.
    pub fn hydrate(
        &mut self,
        conn: &Connection,
        interner: &mut PropertyInterner,
        context_id: ContextId,
        details: &ProjectDetails<'_>,
    ) -> Result<bool> {
        let (id, _) = self.ensure(conn, context_id)?;
        if self.projects.get(&context_id).is_some_and(|p| p.hydrated) {
            debug!(%context_id, "project already hydrated; keeping first details");
            return Ok(false);
        }

        conn.prepare_cached(
            "UPDATE Projects
             SET StartTime = ?1, Targets = ?2, ToolsVersion = ?3, ProjectFile = ?4
             WHERE Id = ?5 AND Targets IS NULL",
        )?
        .execute(params![
            to_micros(details.start_time),
            details.target_names,
            details.tools_version,
            details.project_file,
            id.get(),
        ])?;

        let bags = [
            (details.global_properties, true),
            (details.properties, false),
        ];
        for (bag, global) in bags {
            for (name, value) in bag {
                let property = interner.intern(conn, name, value, false)?;
                conn.prepare_cached(
                    "INSERT INTO ProjectProperties (ProjectId, PropertyId, Global)
                     VALUES (?1, ?2, ?3)",
                )?
                .execute(params![id.get(), property.get(), global])?;
            }
        }

        if let Some(project) = self.projects.get_mut(&context_id) {
            project.hydrated = true;
        }
        Ok(true)
    }

    /// Record `parent` as the parent of `context_id`, creating a placeholder
    /// for the parent if it has not been observed yet.
    ///
    /// Returns `true` when a link was written. A project keeps its first
    /// parent: a repeated link is a no-op and a conflicting one is logged and
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ParentCycle`] for a self-parent or a link that
    /// would close a cycle, or a storage error if a write fails.
    pub fn set_parent(
        &mut self,
        conn: &Connection,
        context_id: ContextId,
        parent: ContextId,
    ) -> Result<bool> {
        if self.is_ancestor_or_self(context_id, parent) {
            return Err(IngestError::ParentCycle { context_id, parent });
        }

        let (child_id, _) = self.ensure(conn, context_id)?;
        match self.projects.get(&context_id).and_then(|p| p.parent) {
            Some(existing) if existing == parent => return Ok(false),
            Some(existing) => {
                warn!(
                    %context_id,
                    %existing,
                    requested = %parent,
                    "project already has a parent; ignoring conflicting link"
                );
                return Ok(false);
            }
            None => {}
        }

        let (parent_id, created) = self.ensure(conn, parent)?;
        if created {
            self.placeholders += 1;
            debug!(%parent, child = %context_id, "created placeholder for parent project");
        }

        conn.prepare_cached("UPDATE Projects SET ParentId = ?1 WHERE Id = ?2")?
            .execute(params![parent_id.get(), child_id.get()])?;
        if let Some(project) = self.projects.get_mut(&context_id) {
            project.parent = Some(parent);
        }
        Ok(true)
    }

    /// Record the end time of a started project.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ProjectNotStarted`] if no project exists for
    /// `context_id`; nothing is written in that case.
    pub fn finish(
        &mut self,
        conn: &Connection,
        context_id: ContextId,
        end_time: DateTime<Utc>,
    ) -> Result<ProjectId> {
        let Some(project) = self.projects.get_mut(&context_id) else {
            return Err(IngestError::ProjectNotStarted { context_id });
        };

        if !project.hydrated {
            warn!(%context_id, "finishing a project whose start details were never seen");
        }
        if project.finished {
            debug!(%context_id, "project finished twice; keeping latest end time");
        }

        conn.prepare_cached("UPDATE Projects SET EndTime = ?1 WHERE Id = ?2")?
            .execute(params![to_micros(end_time), project.id.get()])?;
        project.finished = true;
        Ok(project.id)
    }

    /// True if walking up the parent chain from `candidate` reaches
    /// `context_id` (including `candidate == context_id`).
    fn is_ancestor_or_self(&self, context_id: ContextId, candidate: ContextId) -> bool {
        let mut current = Some(candidate);
        let mut steps = 0;
        while let Some(ctx) = current {
            if ctx == context_id {
                return true;
            }
            steps += 1;
            if steps > self.projects.len() {
                return false;
            }
            current = self.projects.get(&ctx).and_then(|p| p.parent);
        }
        false
    }
}
