use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Result, models::Portal};

pub async fn insert_portal<'e, E>(executor: E, portal: &Portal) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO portals (portal_id, name, slug, base_url, is_active, created_at)
VALUES ($1,$2,$3,$4,$5,$6)",
	)
	.bind(portal.portal_id)
	.bind(portal.name.as_str())
	.bind(portal.slug.as_str())
	.bind(portal.base_url.as_str())
	.bind(portal.is_active)
	.bind(portal.created_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_portal<'e, E>(executor: E, portal_id: Uuid) -> Result<Option<Portal>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, Portal>(
		"\
SELECT portal_id, name, slug, base_url, is_active, created_at
FROM portals
WHERE portal_id = $1",
	)
	.bind(portal_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
