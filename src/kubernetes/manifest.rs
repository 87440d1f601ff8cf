// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifest templating and multi-document YAML parsing.

use crate::constants::placeholders;
use crate::error::{AirliftError, Result};
use kube::api::DynamicObject;
use serde::Deserialize;

/// Values substituted into manifest templates and Helm value overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateVars {
    pub private_registry_url: String,
    pub knative_version: String,
    pub envoy_version: String,
}

impl TemplateVars {
    fn tokens(&self) -> [(&'static str, &str); 3] {
        [
            (placeholders::PRIVATE_REGISTRY_URL, &self.private_registry_url),
            (placeholders::KNATIVE_VERSION, &self.knative_version),
            (placeholders::ENVOY_VERSION, &self.envoy_version),
        ]
    }
}

/// Replace the known placeholders with their values in a single pass.
///
/// Substituted text is never scanned again, and unknown `${...}` tokens are
/// kept as they are.
pub fn render_template(template: &str, vars: &TemplateVars) -> String {
    let tokens = vars.tokens();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find("${") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        match tokens
            .iter()
            .find(|(token, _)| candidate.starts_with(token))
        {
            Some((token, value)) => {
                out.push_str(value);
                rest = &candidate[token.len()..];
            }
            None => {
                out.push_str("${");
                rest = &candidate[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse every non-empty document of a YAML manifest.
///
/// Each document must carry `apiVersion` and `kind` as well as a name.
pub fn parse_manifest(yaml: &str) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let obj: DynamicObject = serde_yaml::from_value(value)?;
        if obj.types.is_none() {
            return Err(AirliftError::Unrecoverable(format!(
                "manifest document {} has no apiVersion/kind",
                index
            )));
        }
        if obj.metadata.name.is_none() {
            return Err(AirliftError::Unrecoverable(format!(
                "manifest document {} has no metadata.name",
                index
            )));
        }
        objects.push(obj);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::ResourceExt;

    fn vars() -> TemplateVars {
        TemplateVars {
            private_registry_url: "registry.local:5000".to_string(),
            knative_version: "1.16.0".to_string(),
            envoy_version: "v1.31-latest".to_string(),
        }
    }

    #[test]
    fn test_render_substitutes_all_placeholders() {
        let rendered = render_template(
            "image: ${PRIVATE_REGISTRY_URL}/envoy:${ENVOY_VERSION}\nversion: ${KNATIVE_VERSION}\n",
            &vars(),
        );
        assert_eq!(
            rendered,
            "image: registry.local:5000/envoy:v1.31-latest\nversion: 1.16.0\n"
        );
    }

    #[test]
    fn test_render_is_single_pass() {
        let mut v = vars();
        v.private_registry_url = "${KNATIVE_VERSION}".to_string();
        assert_eq!(
            render_template("${PRIVATE_REGISTRY_URL}-${KNATIVE_VERSION}", &v),
            "${KNATIVE_VERSION}-1.16.0"
        );
    }

    #[test]
    fn test_render_keeps_unknown_tokens() {
        assert_eq!(
            render_template("${NAME} and $HOME and ${KNATIVE_VERSION}", &vars()),
            "${NAME} and $HOME and 1.16.0"
        );
    }

    #[test]
    fn test_render_repeated_placeholder() {
        assert_eq!(
            render_template("${KNATIVE_VERSION}/${KNATIVE_VERSION}", &vars()),
            "1.16.0/1.16.0"
        );
    }

    #[test]
    fn test_parse_multi_document_manifest() {
        let yaml = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: knative-serving
---
---
apiVersion: operator.knative.dev/v1beta1
kind: KnativeServing
metadata:
  name: knative-serving
  namespace: knative-serving
spec:
  version: "1.16.0"
"#;
        let objects = parse_manifest(yaml).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "KnativeServing");
        assert_eq!(objects[1].namespace().as_deref(), Some("knative-serving"));
        assert_eq!(objects[1].data["spec"]["version"], "1.16.0");
    }

    #[test]
    fn test_parse_rejects_document_without_kind() {
        let yaml = "metadata:\n  name: orphan\n";
        assert!(parse_manifest(yaml).is_err());
    }
}
