//! Authorization guards shared by the route modules.
//!
//! Platform admins pass every garden and ownership guard.

use db::models::{
    garden::{Garden, GardenMember, GardenRole},
    user::User,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::RequestContext, error::ApiError};

pub fn ensure_admin(ctx: &RequestContext) -> Result<(), ApiError> {
    if ctx.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Admin access required"))
    }
}

/// The caller is `user_id`, or an admin.
pub fn ensure_self_or_admin(ctx: &RequestContext, user_id: Uuid) -> Result<(), ApiError> {
    if ctx.user_id() == user_id || ctx.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("You can only modify your own account"))
    }
}

pub async fn garden_role(
    pool: &SqlitePool,
    garden_id: Uuid,
    user_id: Uuid,
) -> Result<Option<GardenRole>, ApiError> {
    Ok(GardenMember::find(pool, garden_id, user_id)
        .await?
        .map(|member| member.role))
}

/// Public gardens are readable by anyone signed in; private ones by members.
pub async fn ensure_garden_reader(
    pool: &SqlitePool,
    garden: &Garden,
    user: &User,
) -> Result<(), ApiError> {
    if garden.is_public || user.is_admin() {
        return Ok(());
    }
    match garden_role(pool, garden.id, user.id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::forbidden("This garden is private")),
    }
}

pub async fn ensure_garden_member(
    pool: &SqlitePool,
    garden: &Garden,
    user: &User,
) -> Result<(), ApiError> {
    if user.is_admin() || garden.owner_id == user.id {
        return Ok(());
    }
    match garden_role(pool, garden.id, user.id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::forbidden(
            "You must be a member of this garden",
        )),
    }
}

/// Owner, a garden manager, or an admin.
pub async fn ensure_garden_manager(
    pool: &SqlitePool,
    garden: &Garden,
    user: &User,
) -> Result<(), ApiError> {
    if user.is_admin() || garden.owner_id == user.id {
        return Ok(());
    }
    match garden_role(pool, garden.id, user.id).await? {
        Some(role) if role.can_manage() => Ok(()),
        _ => Err(ApiError::forbidden(
            "Only garden managers can do that",
        )),
    }
}

pub fn ensure_garden_owner(garden: &Garden, user: &User) -> Result<(), ApiError> {
    if user.is_admin() || garden.owner_id == user.id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Only the garden owner can do that"))
    }
}

/// Whether `user` may manage `garden`, without failing the request.
pub async fn can_manage_garden(
    pool: &SqlitePool,
    garden: &Garden,
    user: &User,
) -> Result<bool, ApiError> {
    match ensure_garden_manager(pool, garden, user).await {
        Ok(()) => Ok(true),
        Err(ApiError::Forbidden(_)) => Ok(false),
        Err(other) => Err(other),
    }
}
