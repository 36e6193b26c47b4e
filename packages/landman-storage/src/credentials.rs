use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{Result, models::PortalCredential};

pub async fn insert_portal_credential<'e, E>(
	executor: E,
	credential: &PortalCredential,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO portal_credentials (
\tcredential_id,
\tuser_id,
\tportal_id,
\tusername,
\tencrypted_password,
\tlabel,
\tis_active,
\tcreated_at,
\tupdated_at
)
VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
	)
	.bind(credential.credential_id)
	.bind(credential.user_id)
	.bind(credential.portal_id)
	.bind(credential.username.as_str())
	.bind(credential.encrypted_password.as_str())
	.bind(credential.label.as_deref())
	.bind(credential.is_active)
	.bind(credential.created_at)
	.bind(credential.updated_at)
	.execute(executor)
	.await?;

	Ok(())
}

/// Most recently updated active credential a user stored for a portal.
pub async fn find_active_credential<'e, E>(
	executor: E,
	user_id: Uuid,
	portal_id: Uuid,
) -> Result<Option<PortalCredential>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, PortalCredential>(
		"\
SELECT
\tcredential_id,
\tuser_id,
\tportal_id,
\tusername,
\tencrypted_password,
\tlabel,
\tis_active,
\tcreated_at,
\tupdated_at
FROM portal_credentials
WHERE user_id = $1 AND portal_id = $2 AND is_active
ORDER BY updated_at DESC
LIMIT 1",
	)
	.bind(user_id)
	.bind(portal_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
