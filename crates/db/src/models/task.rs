//! Maintenance tasks within a garden, optionally tied to a plot and assigned
//! to any number of users.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Type};
use strum_macros::{Display, EnumString};
use utils::pagination::{Page, Pagination};
use uuid::Uuid;

use crate::listing::{Conditions, fetch_page_ordered};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize, EnumString, Display, Default,
)]
#[sqlx(type_name = "task_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub garden_id: Uuid,
    pub plot_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    /// Set when the task enters `completed`, cleared when it leaves.
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithAssignees {
    #[serde(flatten)]
    pub task: Task,
    pub assignees: Vec<Uuid>,
}

impl std::ops::Deref for TaskWithAssignees {
    type Target = Task;
    fn deref(&self) -> &Self::Target {
        &self.task
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub garden_id: Uuid,
    pub plot_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTask {
    pub plot_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<DateTime<Utc>>,
    /// Replaces the assignee list when present.
    pub assignee_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub garden_id: Option<Uuid>,
    pub plot_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub assignee_id: Option<Uuid>,
    /// Restrict to gardens this user is a member of.
    pub member_id: Option<Uuid>,
}

const COLUMNS: &str = "id, garden_id, plot_id, title, description, status, priority, due_date, created_by, completed_at, created_at, updated_at";

pub const SORTABLE: &[&str] = &[
    "title",
    "status",
    "priority",
    "due_date",
    "created_at",
    "updated_at",
];

/// Priorities sort by rank rather than by name.
fn sort_expression(column: &'static str) -> &'static str {
    match column {
        "priority" => {
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 WHEN 'high' THEN 2 WHEN 'urgent' THEN 3 END"
        }
        other => other,
    }
}

fn completed_at_for(status: TaskStatus, previous: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match status {
        TaskStatus::Completed => previous.or_else(|| Some(Utc::now())),
        _ => None,
    }
}

impl Task {
    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Task>(&format!("SELECT {COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_with_assignees(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<Option<TaskWithAssignees>, sqlx::Error> {
        let Some(task) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };
        let assignees = Self::assignees(pool, id).await?;
        Ok(Some(TaskWithAssignees { task, assignees }))
    }

    pub async fn assignees(pool: &SqlitePool, task_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM task_assignees WHERE task_id = $1 ORDER BY rowid ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list(
        pool: &SqlitePool,
        filter: &TaskFilter,
        pagination: &Pagination,
    ) -> Result<Page<TaskWithAssignees>, sqlx::Error> {
        let page: Page<Task> = fetch_page_ordered(
            pool,
            "tasks",
            COLUMNS,
            |qb| {
                let mut conditions = Conditions::default();
                if let Some(garden_id) = filter.garden_id {
                    conditions.next(qb);
                    qb.push("garden_id = ").push_bind(garden_id);
                }
                if let Some(plot_id) = filter.plot_id {
                    conditions.next(qb);
                    qb.push("plot_id = ").push_bind(plot_id);
                }
                if let Some(status) = filter.status {
                    conditions.next(qb);
                    qb.push("status = ").push_bind(status);
                }
                if let Some(priority) = filter.priority {
                    conditions.next(qb);
                    qb.push("priority = ").push_bind(priority);
                }
                if let Some(assignee_id) = filter.assignee_id {
                    conditions.next(qb);
                    qb.push("id IN (SELECT task_id FROM task_assignees WHERE user_id = ")
                        .push_bind(assignee_id)
                        .push(")");
                }
                if let Some(member_id) = filter.member_id {
                    conditions.next(qb);
                    qb.push("garden_id IN (SELECT garden_id FROM garden_members WHERE user_id = ")
                        .push_bind(member_id)
                        .push(")");
                }
            },
            pagination,
            sort_expression,
        )
        .await?;

        let mut assignees = Self::assignees_for(pool, &page.items).await?;
        Ok(page.map(|task| {
            let assignees = assignees.remove(&task.id).unwrap_or_default();
            TaskWithAssignees { task, assignees }
        }))
    }

    async fn assignees_for(
        pool: &SqlitePool,
        tasks: &[Task],
    ) -> Result<HashMap<Uuid, Vec<Uuid>>, sqlx::Error> {
        let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        if tasks.is_empty() {
            return Ok(map);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT task_id, user_id FROM task_assignees WHERE task_id IN (",
        );
        let mut separated = qb.separated(", ");
        for task in tasks {
            separated.push_bind(task.id);
        }
        separated.push_unseparated(") ORDER BY rowid ASC");

        let rows: Vec<(Uuid, Uuid)> = qb.build_query_as().fetch_all(pool).await?;
        for (task_id, user_id) in rows {
            map.entry(task_id).or_default().push(user_id);
        }
        Ok(map)
    }

    pub async fn create(
        pool: &SqlitePool,
        created_by: Uuid,
        data: &CreateTask,
    ) -> Result<TaskWithAssignees, sqlx::Error> {
        let now = Utc::now();
        let status = data.status.unwrap_or_default();
        let mut tx = pool.begin().await?;

        let task = sqlx::query_as::<_, Task>(&format!(
            r#"INSERT INTO tasks (id, garden_id, plot_id, title, description, status, priority, due_date, created_by, completed_at, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
               RETURNING {COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(data.garden_id)
        .bind(data.plot_id)
        .bind(&data.title)
        .bind(&data.description)
        .bind(status)
        .bind(data.priority.unwrap_or_default())
        .bind(data.due_date)
        .bind(created_by)
        .bind(completed_at_for(status, None))
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let assignees = dedup(&data.assignee_ids);
        for user_id in &assignees {
            sqlx::query("INSERT INTO task_assignees (task_id, user_id) VALUES ($1, $2)")
                .bind(task.id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(TaskWithAssignees { task, assignees })
    }

    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        data: &UpdateTask,
    ) -> Result<TaskWithAssignees, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let plot_id = data.plot_id.or(existing.plot_id);
        let title = data.title.as_ref().unwrap_or(&existing.title);
        let description = data.description.as_ref().or(existing.description.as_ref());
        let status = data.status.unwrap_or(existing.status);
        let priority = data.priority.unwrap_or(existing.priority);
        let due_date = data.due_date.or(existing.due_date);

        let mut tx = pool.begin().await?;
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"UPDATE tasks
               SET plot_id = $2, title = $3, description = $4, status = $5, priority = $6,
                   due_date = $7, completed_at = $8, updated_at = $9
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(plot_id)
        .bind(title)
        .bind(description)
        .bind(status)
        .bind(priority)
        .bind(due_date)
        .bind(completed_at_for(status, existing.completed_at))
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        if let Some(ids) = &data.assignee_ids {
            sqlx::query("DELETE FROM task_assignees WHERE task_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for user_id in dedup(ids) {
                sqlx::query("INSERT INTO task_assignees (task_id, user_id) VALUES ($1, $2)")
                    .bind(id)
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        let assignees = Self::assignees(pool, id).await?;
        Ok(TaskWithAssignees { task, assignees })
    }

    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Self, sqlx::Error> {
        let existing = Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        sqlx::query_as::<_, Task>(&format!(
            r#"UPDATE tasks SET status = $2, completed_at = $3, updated_at = $4
               WHERE id = $1
               RETURNING {COLUMNS}"#
        ))
        .bind(id)
        .bind(status)
        .bind(completed_at_for(status, existing.completed_at))
        .bind(Utc::now())
        .fetch_one(pool)
        .await
    }

    pub async fn delete(pool: &SqlitePool, id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_at_tracks_completion() {
        let earlier = Utc::now() - chrono::Duration::hours(2);
        assert!(completed_at_for(TaskStatus::Pending, Some(earlier)).is_none());
        assert_eq!(
            completed_at_for(TaskStatus::Completed, Some(earlier)),
            Some(earlier)
        );
        assert!(completed_at_for(TaskStatus::Completed, None).is_some());
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup(&[b, a, b, a]), vec![b, a]);
    }
}
