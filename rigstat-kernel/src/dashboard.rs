//! Page statique du dashboard ; le polling de /api/stats se fait côté navigateur.

use axum::response::Html;

const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");

// GET /dashboard
pub async fn dashboard_page() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}
