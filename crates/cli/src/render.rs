use mcp_openapi_tools::descriptor::{ToolDescriptor, ToolParameter};
use owo_colors::OwoColorize as _;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy)]
pub struct Style {
    color: bool,
}

impl Style {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn name(self, s: &str) -> String {
        if self.color {
            s.bold().green().to_string()
        } else {
            s.to_string()
        }
    }

    fn heading(self, s: &str) -> String {
        if self.color {
            s.bold().to_string()
        } else {
            s.to_string()
        }
    }

    fn dim(self, s: &str) -> String {
        if self.color {
            s.dimmed().to_string()
        } else {
            s.to_string()
        }
    }
}

/// Human-readable listing of tools, one block per tool.
pub fn tools(tools: &[ToolDescriptor], style: Style) -> String {
    let mut out = String::new();
    for tool in tools {
        let _ = writeln!(out, "{}", style.name(&tool.name));
        let _ = writeln!(out, "  {}", tool.description);
        let _ = writeln!(out, "  {}", style.dim(&format!("{} {}", tool.method, tool.path)));

        let params: Vec<&ToolParameter> = tool.query_params().collect();
        if !params.is_empty() {
            let _ = writeln!(out, "  {}", style.heading("Parameters:"));
            for param in params {
                let _ = writeln!(out, "    - {}", parameter_line(param));
            }
        }

        for (content_type, params) in tool.body_by_content_type() {
            let _ = writeln!(out, "  {}", style.heading(&format!("Body ({content_type}):")));
            for param in params {
                let mut line = parameter_line(param);
                let _ = write!(line, " -> {}", body_target(param));
                let _ = writeln!(out, "    - {line}");
            }
        }
        out.push('\n');
    }
    out
}

fn parameter_line(param: &ToolParameter) -> String {
    let mut attrs = vec![param.param_type.to_string()];
    if param.required {
        attrs.push("required".to_string());
    }
    if let Some(default) = &param.default {
        attrs.push(format!("default {default}"));
    }
    let mut line = format!("{} ({})", param.name, attrs.join(", "));
    if let Some(description) = &param.description {
        let _ = write!(line, ": {description}");
    }
    line
}

fn body_target(param: &ToolParameter) -> String {
    match &param.request_body_parent {
        Some(parent) => format!("{parent}.{}", param.body_field()),
        None => param.body_field().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcp_openapi_tools::descriptor::tools_from_spec;
    use mcp_openapi_tools::loader::{RouteFilter, SpecLoader};

    const SPEC: &str = r"
openapi: 3.0.0
info: {title: Pets, version: '1'}
paths:
  /pets/{petId}:
    put:
      operationId: updatePet
      summary: Update a pet
      parameters:
        - name: petId
          in: path
          required: true
          schema: {type: string}
        - name: notify
          in: query
          schema: {type: boolean, default: false}
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name: {type: string, description: New name}
                owner:
                  type: object
                  properties:
                    email: {type: string}
      responses:
        '200': {description: ok}
";

    fn listing() -> String {
        let filter = RouteFilter::new(["/pets"]).expect("filter");
        let spec = SpecLoader::new(reqwest::Client::new())
            .parse(SPEC, "pets.yaml", &filter)
            .expect("spec");
        tools(&tools_from_spec(&spec, &[]), Style::new(false))
    }

    #[test]
    fn lists_parameters_and_body_fields() {
        let expected = "\
update_pet
  Update a pet
  PUT /pets/{petId}
  Parameters:
    - petId (str, required)
    - notify (bool, default false)
  Body (application/json):
    - j_name (str, required): New name -> name
    - j_owner_email (str) -> owner.email

";
        assert_eq!(listing(), expected);
    }

    #[test]
    fn colored_output_contains_escape_codes() {
        assert!(Style::new(true).name("x").contains('\u{1b}'));
        assert_eq!(Style::new(false).name("x"), "x");
    }
}
