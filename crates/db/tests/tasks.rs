//! Integration tests for tasks and their assignees.

mod common;

use common::{create_garden, create_user, setup_test_pool};
use db::models::{
    garden::{GardenMember, GardenRole},
    plot::{CreatePlot, Plot, PlotStatus},
    task::{CreateTask, Task, TaskFilter, TaskPriority, TaskStatus, UpdateTask},
};
use utils::pagination::{PageParams, Pagination};
use uuid::Uuid;

fn new_task(garden_id: Uuid, title: &str) -> CreateTask {
    CreateTask {
        garden_id,
        plot_id: None,
        title: title.to_string(),
        description: None,
        status: None,
        priority: None,
        due_date: None,
        assignee_ids: Vec::new(),
    }
}

#[tokio::test]
async fn test_create_task_round_trip() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let helper = create_user(&pool, "Helper").await;
    let garden = create_garden(&pool, &owner, "Tasks", true).await;

    let mut data = new_task(garden.id, "Turn the compost");
    data.description = Some("Both bins".to_string());
    data.priority = Some(TaskPriority::High);
    data.assignee_ids = vec![helper.id, owner.id, helper.id];

    let created = Task::create(&pool, owner.id, &data).await.unwrap();
    assert_eq!(created.assignees, vec![helper.id, owner.id]);

    let fetched = Task::find_with_assignees(&pool, created.id)
        .await
        .unwrap()
        .expect("task should exist");
    assert_eq!(fetched.title, "Turn the compost");
    assert_eq!(fetched.description.as_deref(), Some("Both bins"));
    assert_eq!(fetched.status, TaskStatus::Pending);
    assert_eq!(fetched.priority, TaskPriority::High);
    assert_eq!(fetched.created_by, owner.id);
    assert_eq!(fetched.assignees, vec![helper.id, owner.id]);
}

#[tokio::test]
async fn test_completing_task_stamps_completed_at() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Tasks", true).await;
    let task = Task::create(&pool, owner.id, &new_task(garden.id, "Weed bed 4"))
        .await
        .unwrap();
    assert!(task.completed_at.is_none());

    let done = Task::update_status(&pool, task.id, TaskStatus::Completed)
        .await
        .unwrap();
    assert!(done.completed_at.is_some());

    let reopened = Task::update_status(&pool, task.id, TaskStatus::InProgress)
        .await
        .unwrap();
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn test_update_replaces_assignees_only_when_given() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let a = create_user(&pool, "Alice").await;
    let b = create_user(&pool, "Bob").await;
    let garden = create_garden(&pool, &owner, "Tasks", true).await;

    let mut data = new_task(garden.id, "Fix the fence");
    data.assignee_ids = vec![a.id];
    let task = Task::create(&pool, owner.id, &data).await.unwrap();

    let renamed = Task::update(
        &pool,
        task.id,
        &UpdateTask {
            title: Some("Fix the north fence".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(renamed.title, "Fix the north fence");
    assert_eq!(renamed.assignees, vec![a.id]);

    let reassigned = Task::update(
        &pool,
        task.id,
        &UpdateTask {
            assignee_ids: Some(vec![b.id]),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(reassigned.assignees, vec![b.id]);
}

#[tokio::test]
async fn test_task_filters_combine() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let helper = create_user(&pool, "Helper").await;
    let garden = create_garden(&pool, &owner, "North", true).await;
    let other = create_garden(&pool, &owner, "South", true).await;

    let plot = Plot::create(
        &pool,
        garden.id,
        &CreatePlot {
            name: "Bed 1".to_string(),
            size_sqm: Some(6.0),
            soil_type: None,
        },
    )
    .await
    .unwrap();

    let mut on_plot = new_task(garden.id, "Mulch bed 1");
    on_plot.plot_id = Some(plot.id);
    on_plot.assignee_ids = vec![helper.id];
    Task::create(&pool, owner.id, &on_plot).await.unwrap();

    let mut urgent = new_task(garden.id, "Repair tap");
    urgent.priority = Some(TaskPriority::Urgent);
    Task::create(&pool, owner.id, &urgent).await.unwrap();

    Task::create(&pool, owner.id, &new_task(other.id, "Paint shed"))
        .await
        .unwrap();

    let by_garden = TaskFilter {
        garden_id: Some(garden.id),
        ..Default::default()
    };
    let page = Task::list(&pool, &by_garden, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let by_assignee = TaskFilter {
        assignee_id: Some(helper.id),
        ..Default::default()
    };
    let page = Task::list(&pool, &by_assignee, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Mulch bed 1");
    assert_eq!(page.items[0].assignees, vec![helper.id]);

    let urgent_only = TaskFilter {
        garden_id: Some(garden.id),
        priority: Some(TaskPriority::Urgent),
        ..Default::default()
    };
    let page = Task::list(&pool, &urgent_only, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Repair tap");
}

#[tokio::test]
async fn test_member_filter_scopes_to_joined_gardens() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let member = create_user(&pool, "Member").await;
    let joined = create_garden(&pool, &owner, "Joined", true).await;
    let elsewhere = create_garden(&pool, &owner, "Elsewhere", true).await;
    GardenMember::add(&pool, joined.id, member.id, GardenRole::Member)
        .await
        .unwrap();

    Task::create(&pool, owner.id, &new_task(joined.id, "Visible"))
        .await
        .unwrap();
    Task::create(&pool, owner.id, &new_task(elsewhere.id, "Hidden"))
        .await
        .unwrap();

    let filter = TaskFilter {
        member_id: Some(member.id),
        ..Default::default()
    };
    let page = Task::list(&pool, &filter, &Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Visible");
}

#[tokio::test]
async fn test_task_pagination_bounds_the_slice() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Paged", true).await;
    for i in 1..=5 {
        Task::create(&pool, owner.id, &new_task(garden.id, &format!("Task {i}")))
            .await
            .unwrap();
    }

    let second_page = PageParams {
        page: Some(2),
        limit: Some(2),
        sort: None,
    }
    .resolve(db::models::task::SORTABLE)
    .unwrap();
    let page = Task::list(&pool, &TaskFilter::default(), &second_page)
        .await
        .unwrap();
    let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["Task 3", "Task 4"]);
    assert_eq!(page.total, 5);
    assert_eq!(page.page, 2);
}

#[tokio::test]
async fn test_priority_sorts_by_rank() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let garden = create_garden(&pool, &owner, "Ranked", true).await;
    for (title, priority) in [
        ("Weed", TaskPriority::Low),
        ("Fence", TaskPriority::Urgent),
        ("Mulch", TaskPriority::Medium),
        ("Prune", TaskPriority::High),
    ] {
        let mut task = new_task(garden.id, title);
        task.priority = Some(priority);
        Task::create(&pool, owner.id, &task).await.unwrap();
    }

    let by_rank = PageParams {
        sort: Some("-priority".to_string()),
        ..Default::default()
    }
    .resolve(db::models::task::SORTABLE)
    .unwrap();
    let page = Task::list(&pool, &TaskFilter::default(), &by_rank)
        .await
        .unwrap();
    let titles: Vec<_> = page.items.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, ["Fence", "Prune", "Mulch", "Weed"]);
}

#[tokio::test]
async fn test_plot_assignment_cycle() {
    let (pool, _temp_dir) = setup_test_pool().await;
    let owner = create_user(&pool, "Owner").await;
    let gardener = create_user(&pool, "Gardener").await;
    let garden = create_garden(&pool, &owner, "Plots", true).await;
    let plot = Plot::create(
        &pool,
        garden.id,
        &CreatePlot {
            name: "Bed 7".to_string(),
            size_sqm: None,
            soil_type: Some("loam".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(plot.status, PlotStatus::Available);

    let assigned = Plot::assign(&pool, plot.id, gardener.id).await.unwrap();
    assert_eq!(assigned.status, PlotStatus::Assigned);
    assert_eq!(assigned.assigned_to, Some(gardener.id));

    let released = Plot::release(&pool, plot.id).await.unwrap();
    assert_eq!(released.status, PlotStatus::Available);
    assert!(released.assigned_to.is_none());

    let filtered = Plot::list_for_garden(
        &pool,
        garden.id,
        Some(PlotStatus::Assigned),
        &Pagination::default(),
    )
    .await
    .unwrap();
    assert_eq!(filtered.total, 0);
}
