//! Generated files for a microservice directory.
//!
//! The entry-point embeds user code verbatim as a live handler. Nothing is
//! sandboxed beyond the container itself: whoever can create or edit a
//! microservice can run arbitrary code in its image.

use crate::models::MicroserviceDefinition;

pub const ENTRY_POINT_FILE: &str = "app.py";
pub const BUILD_DESCRIPTOR_FILE: &str = "Dockerfile";

/// Port the generated service listens on inside its container.
pub const SERVICE_PORT: u16 = 8000;

pub const HEALTH_PATH: &str = "/health";

/// Name of the function user code must define; it is mounted on `/`.
pub const ROOT_HANDLER: &str = "root";

const BASE_IMAGE: &str = "python:3.11-slim";

/// Render `app.py`: health-check handler, user code, root route registration.
pub fn entry_point(definition: &MicroserviceDefinition) -> String {
    let mut out = String::new();
    if let Some(description) = &definition.description {
        for line in description.lines() {
            out.push_str(&format!("# {line}\n"));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        r#"from fastapi import FastAPI

app = FastAPI()


@app.get("{HEALTH_PATH}")
def health():
    return {{"status": "ok", "message": "Microservice active"}}


{code}


app.add_api_route("/", {ROOT_HANDLER}, methods=["GET", "POST"])
"#,
        code = definition.source_code,
    ));
    out
}

/// Render the `Dockerfile`. Only the name varies between microservices.
pub fn build_descriptor(name: &str) -> String {
    format!(
        r#"# Dockerfile for microservice {name}
FROM {BASE_IMAGE}

WORKDIR /app

COPY . /app

RUN pip install fastapi uvicorn

EXPOSE {SERVICE_PORT}

CMD ["uvicorn", "app:app", "--host", "0.0.0.0", "--port", "{SERVICE_PORT}"]
"#
    )
}
