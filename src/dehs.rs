//! DEHS XML status output: a fixed-order, manually-escaped XML fragment
//! consumed by release-tracking dashboards.

pub struct Component {
    pub package: String,
    pub debian_uversion: Option<String>,
    pub debian_mangled_uversion: Option<String>,
    pub upstream_version: Option<String>,
    pub upstream_url: Option<String>,
    pub decoded_checksum: Option<String>,
    pub status: Option<String>,
    pub target: Option<String>,
    pub target_path: Option<String>,
    pub messages: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Component {
    pub fn new(package: &str) -> Component {
        Component {
            package: package.to_string(),
            debian_uversion: None,
            debian_mangled_uversion: None,
            upstream_version: None,
            upstream_url: None,
            decoded_checksum: None,
            status: None,
            target: None,
            target_path: None,
            messages: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn tag(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("<{}>{}</{}>\n", name, escape(value), name));
}

pub fn render(components: &[Component], top_level_errors: &[String]) -> String {
    let mut out = String::new();
    out.push_str("<dehs>\n");

    for c in components {
        out.push_str("<component id=\"");
        out.push_str(&escape(&c.package));
        out.push_str("\">\n");

        tag(&mut out, "package", &c.package);
        if let Some(v) = &c.debian_uversion {
            tag(&mut out, "debian-uversion", v);
        }
        if let Some(v) = &c.debian_mangled_uversion {
            tag(&mut out, "debian-mangled-uversion", v);
        }
        if let Some(v) = &c.upstream_version {
            tag(&mut out, "upstream-version", v);
        }
        if let Some(v) = &c.upstream_url {
            tag(&mut out, "upstream-url", v);
        }
        if let Some(v) = &c.decoded_checksum {
            tag(&mut out, "decoded-checksum", v);
        }
        for m in &c.messages {
            tag(&mut out, "messages", m);
        }
        for w in &c.warnings {
            tag(&mut out, "warnings", w);
        }
        for e in &c.errors {
            tag(&mut out, "errors", e);
        }
        if let Some(v) = &c.status {
            tag(&mut out, "status", v);
        }
        if let Some(v) = &c.target {
            tag(&mut out, "target", v);
        }
        if let Some(v) = &c.target_path {
            tag(&mut out, "target-path", v);
        }

        out.push_str("</component>\n");
    }

    for e in top_level_errors {
        tag(&mut out, "errors", e);
    }

    out.push_str("</dehs>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_entities() {
        assert_eq!(escape("a<b>c&d"), "a&lt;b&gt;c&amp;d");
    }

    #[test]
    fn renders_single_component() {
        let mut c = Component::new("foo");
        c.upstream_version = Some("1.2.3".to_string());
        c.status = Some("up to date".to_string());
        let xml = render(&[c], &[]);
        assert!(xml.contains("<package>foo</package>"));
        assert!(xml.contains("<upstream-version>1.2.3</upstream-version>"));
        assert!(xml.starts_with("<dehs>\n"));
        assert!(xml.trim_end().ends_with("</dehs>"));
    }
}
