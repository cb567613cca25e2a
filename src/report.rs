//! Markdown summary of a conversion, written by `faktory convert --report`.

use crate::converter::Conversion;
use std::fs;
use std::io;
use std::path::Path;

fn escape(cell: &str) -> String {
    cell.replace('|', "\\|")
}

impl Conversion {
    /// Render the conversion as markdown
    pub fn render_markdown(&self) -> String {
        let mut markdown = String::new();

        markdown.push_str(&format!("# Image: {}\n\n", self.tag));

        markdown.push_str("## Conversion\n\n");
        markdown.push_str(&format!("- **Source**: {}\n", self.source));
        markdown.push_str(&format!("- **Base**: {}\n", self.base));
        markdown.push_str(&format!("- **Splitter**: {}\n", self.splitter));
        markdown.push_str(&format!("- **Manifest**: `{}`\n", self.manifest));
        markdown.push_str(&format!("- **Platform**: {}\n", self.config.platform));
        if let Some(created) = &self.config.created {
            markdown.push_str(&format!("- **Created**: {}\n", created));
        }
        markdown.push_str(&format!(
            "- **Application paths**: {}\n",
            self.application_paths
        ));
        markdown.push('\n');

        markdown.push_str("## Container Configuration\n\n");

        if let Some(entrypoint) = &self.config.entrypoint {
            markdown.push_str("### Entrypoint\n\n");
            markdown.push_str("```\n");
            markdown.push_str(&format!("{}\n", entrypoint.join(" ")));
            markdown.push_str("```\n\n");
        }

        if let Some(cmd) = &self.config.cmd {
            markdown.push_str("### Command\n\n");
            markdown.push_str("```\n");
            markdown.push_str(&format!("{}\n", cmd.join(" ")));
            markdown.push_str("```\n\n");
        }

        if !self.config.env.is_empty() {
            markdown.push_str("### Environment Variables\n\n");
            markdown.push_str("```\n");
            for env in self.config.env_list() {
                markdown.push_str(&format!("{}\n", env));
            }
            markdown.push_str("```\n\n");
        }

        if let Some(working_dir) = &self.config.working_dir {
            markdown.push_str(&format!("### Working Directory\n\n`{}`\n\n", working_dir));
        }

        if !self.config.labels.is_empty() {
            markdown.push_str("### Labels\n\n");
            markdown.push_str("| Key | Value |\n");
            markdown.push_str("|-----|-------|\n");
            for (key, value) in &self.config.labels {
                markdown.push_str(&format!("| `{}` | `{}` |\n", escape(key), escape(value)));
            }
            markdown.push('\n');
        }

        markdown.push_str("## Layers\n\n");
        markdown.push_str("| Digest | Size | Origin |\n");
        markdown.push_str("|--------|------|--------|\n");
        for layer in &self.layers {
            let origin = if layer.from_base {
                "base"
            } else {
                "application"
            };
            markdown.push_str(&format!(
                "| `{}` | {} | {} |\n",
                layer.digest, layer.size, origin
            ));
        }
        markdown.push('\n');

        if !self.conflicts.is_empty() {
            markdown.push_str("## Conflicts\n\n");
            markdown.push_str("These paths exist in the base with different content; the application copy is kept.\n\n");
            for path in &self.conflicts {
                markdown.push_str(&format!("- `{}`\n", path.display()));
            }
            markdown.push('\n');
        }

        markdown
    }

    /// Save as markdown file
    pub fn save_markdown(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render_markdown())
    }
}
