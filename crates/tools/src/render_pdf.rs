//! Render tool — exposes the LaTeX renderer to the agent as `render_latex_pdf`.

use async_trait::async_trait;
use paperclaw_core::error::ToolError;
use paperclaw_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::latex::LatexRenderer;

pub const TOOL_NAME: &str = "render_latex_pdf";

pub struct RenderLatexPdfTool {
    renderer: LatexRenderer,
}

impl RenderLatexPdfTool {
    pub fn new(renderer: LatexRenderer) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &LatexRenderer {
        &self.renderer
    }
}

#[async_trait]
impl Tool for RenderLatexPdfTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn description(&self) -> &str {
        "Compile a complete LaTeX document (from \\documentclass to \\end{document}) into a PDF. \
         Returns the absolute path of the generated PDF file."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "latex_content": {
                    "type": "string",
                    "description": "The full LaTeX source of the document"
                }
            },
            "required": ["latex_content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let source = arguments["latex_content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'latex_content' argument".into()))?;

        let doc = self.renderer.render(source).await?;
        let path = doc.path.display().to_string();
        info!(tool = TOOL_NAME, job_id = doc.job_id, path = %path, "Rendered PDF");

        Ok(ToolResult::ok(path.clone()).with_data(serde_json::json!({
            "path": path,
            "job_id": doc.job_id,
            "bytes": doc.bytes,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperclaw_core::RenderErrorKind;

    #[test]
    fn tool_definition() {
        let tool = RenderLatexPdfTool::new(LatexRenderer::new("tectonic", "output"));
        assert_eq!(tool.name(), "render_latex_pdf");
        let def = tool.to_definition();
        assert_eq!(def.parameters["required"], serde_json::json!(["latex_content"]));
        assert_eq!(def.parameters["properties"]["latex_content"]["type"], "string");
    }

    #[tokio::test]
    async fn missing_argument_is_rejected() {
        let tool = RenderLatexPdfTool::new(LatexRenderer::new("tectonic", "output"));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = tool
            .execute(serde_json::json!({"latex_content": 42}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn launch_failure_surfaces_as_render_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = LatexRenderer::new(
            dir.path().join("missing-engine").display().to_string(),
            dir.path().join("output"),
        );
        let tool = RenderLatexPdfTool::new(renderer);

        let err = tool
            .execute(serde_json::json!({"latex_content": "\\documentclass{article}"}))
            .await
            .unwrap_err();
        match err {
            ToolError::Render(render) => assert_eq!(render.kind(), RenderErrorKind::Invocation),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn returns_pdf_path_and_metadata() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let engine = dir.path().join("engine");
        std::fs::write(
            &engine,
            "#!/bin/sh\nprintf '%%PDF-1.5\\n' > \"$3/paper.pdf\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&engine, std::fs::Permissions::from_mode(0o755)).unwrap();

        let output_dir = dir.path().join("output");
        let tool = RenderLatexPdfTool::new(LatexRenderer::new(engine.display().to_string(), &output_dir));
        let result = tool
            .execute(serde_json::json!({
                "latex_content": "\\documentclass{article}\\begin{document}x\\end{document}"
            }))
            .await
            .unwrap();

        let expected = output_dir.join("paper.pdf");
        assert!(result.success);
        assert_eq!(result.output, expected.display().to_string());
        let data = result.data.unwrap();
        assert_eq!(data["path"], expected.display().to_string());
        assert_eq!(data["job_id"], 1);
        assert_eq!(data["bytes"], 9);
    }
}
