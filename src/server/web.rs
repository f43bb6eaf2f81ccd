//! Browser channel: the analysis page and the HTML fragment it posts to.
//!
//! Templates are compiled into the binary and rendered with tera. The page
//! uses htmx to swap the fragment returned by `POST /web/analyze` into the
//! result area.

use axum::extract::State;
use axum::response::Html;
use axum::Form;
use serde::Deserialize;
use tera::{Context, Tera};

use super::routes::{run_detached, AppState};
use crate::core::{AppError, AssociationKind, ProcessingResult, Source, WordValidator};

const INDEX_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>LexiconAI</title>
    <script src="https://unpkg.com/htmx.org@1.9.12"></script>
    <style>
        body { font-family: system-ui, sans-serif; max-width: 40rem; margin: 3rem auto; padding: 0 1rem; }
        form { display: flex; gap: .5rem; }
        input[name=text] { flex: 1; padding: .5rem; font-size: 1rem; }
        .error { color: #b00020; }
        .words { display: flex; flex-wrap: wrap; gap: .4rem; list-style: none; padding: 0; }
        .words li { background: #eef; border-radius: .3rem; padding: .2rem .5rem; }
        .htmx-indicator { display: none; }
        .htmx-request .htmx-indicator { display: inline; }
    </style>
</head>
<body>
    <h1>LexiconAI</h1>
    <p>Введите русское слово, чтобы получить синонимы и антонимы.</p>
    <form hx-post="/web/analyze" hx-target="#result" hx-indicator="#loading">
        <input type="text" name="text" placeholder="Например: счастье" required autofocus>
        <button type="submit">Анализ</button>
    </form>
    <p id="loading" class="htmx-indicator">Анализирую…</p>
    <div id="result"></div>
</body>
</html>
"##;

const RESULT_TEMPLATE: &str = r#"<section class="result">
    <h2>{{ original_text }}</h2>
    {% if error %}
    <p class="error">{{ error }}</p>
    {% else %}
    <h3>Синонимы</h3>
    {% if synonyms | length > 0 %}
    <ul class="words">{% for word in synonyms %}<li>{{ word }}</li>{% endfor %}</ul>
    {% else %}
    <p>Не найдены</p>
    {% endif %}
    <h3>Антонимы</h3>
    {% if antonyms | length > 0 %}
    <ul class="words">{% for word in antonyms %}<li>{{ word }}</li>{% endfor %}</ul>
    {% else %}
    <p>Не найдены</p>
    {% endif %}
    {% endif %}
</section>
"#;

/// Build the template registry. Autoescaping is on for every `.html` name.
pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_templates(vec![
        ("index.html", INDEX_TEMPLATE),
        ("partials/result.html", RESULT_TEMPLATE),
    ])?;
    Ok(tera)
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeForm {
    pub text: String,
}

fn render(tera: &Tera, name: &str, context: &Context) -> Result<Html<String>, AppError> {
    tera.render(name, context).map(Html).map_err(|e| {
        AppError::internal("Не удалось отобразить страницу")
            .with_detail("template", name)
            .with_detail("error", e.to_string())
    })
}

/// Context for `partials/result.html`.
fn result_context(original_text: &str, outcome: &ProcessingResult) -> Context {
    let mut context = Context::new();
    context.insert("original_text", original_text);
    context.insert("error", &outcome.error);
    context.insert(
        "synonyms",
        &outcome.words_of(AssociationKind::Synonym).collect::<Vec<_>>(),
    );
    context.insert(
        "antonyms",
        &outcome.words_of(AssociationKind::Antonym).collect::<Vec<_>>(),
    );
    context
}

/// GET / and GET /chat
pub async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    render(&state.templates, "index.html", &Context::new())
}

/// POST /web/analyze - form field `text`, returns the result fragment.
pub async fn analyze_handler(
    State(state): State<AppState>,
    Form(form): Form<AnalyzeForm>,
) -> Result<Html<String>, AppError> {
    tracing::info!(text = %form.text, "Web analysis request");

    let outcome = if WordValidator::is_cyrillic(&form.text) {
        run_detached(&state.service, form.text.clone(), Source::Web).await?
    } else {
        ProcessingResult::failed("Пожалуйста, используйте только кириллицу.")
    };

    render(
        &state.templates,
        "partials/result.html",
        &result_context(&form.text, &outcome),
    )
}
