pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_portals.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_portals.sql")),
				"tables/002_portal_credentials.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_portal_credentials.sql")),
				"tables/003_search_tasks.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_search_tasks.sql")),
				"tables/004_search_results.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_search_results.sql")),
				"tables/005_document_reviews.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_document_reviews.sql")),
				"tables/006_pipeline_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_pipeline_jobs.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
