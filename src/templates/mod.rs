use crate::commands::generator::Page;
use crate::commands::store::ProjectKind;

/// Markers that show a file already carries a WordPress header.
pub const HEADER_MARKERS: [&str; 2] = ["Plugin Name:", "Theme Name:"];

/// Returns the WordPress file header for a plugin or theme main file.
pub fn file_header(kind: ProjectKind, name: &str, description: &str) -> String {
    let label = match kind {
        ProjectKind::Plugin => "Plugin Name",
        ProjectKind::Theme => "Theme Name",
    };
    format!(
        r#"<?php
/*
{label}: {name}
Description: {description}
Version: 1.0
*/

"#
    )
}

/// True when `code` already declares a plugin or theme header.
pub fn has_header(code: &str) -> bool {
    HEADER_MARKERS.iter().any(|m| code.contains(m))
}

/// Quotes `value` as a single-quoted PHP string literal.
pub fn php_string(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// PHP that creates the page, or updates the one with the same slug, and
/// prints the saved post (or `{"error": ...}`) as JSON.
pub fn page_upsert_script(page: &Page) -> String {
    let title = php_string(&page.title);
    let content = php_string(&page.content);
    let slug = php_string(&page.slug);
    format!(
        r#"<?php
require_once('/wordpress/wp-load.php');

$existing = get_posts(array(
    'post_type' => 'page',
    'name' => {slug},
    'post_status' => 'any',
    'posts_per_page' => 1
));

$page = array(
    'post_title' => {title},
    'post_content' => {content},
    'post_status' => 'publish',
    'post_type' => 'page',
    'post_name' => {slug}
);

if ($existing) {{
    $page['ID'] = $existing[0]->ID;
    $result = wp_update_post($page, true);
}} else {{
    $result = wp_insert_post($page, true);
}}

if ($result && !is_wp_error($result)) {{
    echo json_encode(get_post($result));
}} else {{
    echo json_encode(array('error' => is_wp_error($result) ? $result->get_error_message() : 'Could not save page'));
}}
"#
    )
}
