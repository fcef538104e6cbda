// SPDX-License-Identifier: AGPL-3.0-or-later
//! Rendering to the engine's JSON configuration syntax

use serde_json::{json, Map, Number};

use super::engine::Credentials;
use super::model::{Declaration, ReferenceTarget, Value};
use super::DescriptorSet;
use crate::error::{OutpostError, Result};

/// Render a validated set as an engine configuration document
///
/// Object keys come out sorted, so the document depends only on the set's
/// contents and not on the order declarations were written in.
pub fn render(set: &DescriptorSet, credentials: &Credentials) -> Result<serde_json::Value> {
    set.validate()?;

    let mut required = Map::new();
    let mut providers = Map::new();

    for binding in &set.providers {
        let mut requirement = Map::new();
        requirement.insert("source".to_string(), json!(binding.source));
        if let Some(version) = &binding.version {
            requirement.insert("version".to_string(), json!(version));
        }
        required.insert(binding.provider.clone(), requirement.into());

        let mut settings = Map::new();
        for (key, value) in &binding.settings {
            settings.insert(key.clone(), render_value(set, value)?);
        }
        if let (Some(field), Some(token)) =
            (&binding.token_field, credentials.token(&binding.namespace))
        {
            settings.insert(field.clone(), json!(token));
        }
        providers.insert(binding.provider.clone(), settings.into());
    }

    let mut resources = Map::new();
    let mut data_sources = Map::new();

    for declaration in &set.declarations {
        let engine_type = engine_type_of(set, declaration)?;
        let target = if declaration.data {
            &mut data_sources
        } else {
            &mut resources
        };

        let mut attributes = Map::new();
        for (key, value) in &declaration.attributes {
            attributes.insert(key.clone(), render_value(set, value)?);
        }

        let by_type = target
            .entry(engine_type)
            .or_insert_with(|| serde_json::Value::Object(Map::new()));
        if let serde_json::Value::Object(by_name) = by_type {
            by_name.insert(declaration.name.clone(), attributes.into());
        }
    }

    let mut document = Map::new();
    document.insert(
        "terraform".to_string(),
        json!({ "required_providers": required }),
    );
    if !providers.is_empty() {
        document.insert("provider".to_string(), providers.into());
    }
    if !resources.is_empty() {
        document.insert("resource".to_string(), resources.into());
    }
    if !data_sources.is_empty() {
        document.insert("data".to_string(), data_sources.into());
    }

    Ok(document.into())
}

fn engine_type_of(set: &DescriptorSet, declaration: &Declaration) -> Result<String> {
    let namespace = declaration.kind.namespace();
    let binding = set
        .binding_for(namespace)
        .ok_or_else(|| OutpostError::UnboundNamespace {
            namespace: namespace.to_string(),
            address: declaration.address(),
        })?;
    Ok(binding.engine_type(&declaration.kind).to_string())
}

fn render_value(set: &DescriptorSet, value: &Value) -> Result<serde_json::Value> {
    let rendered = match value {
        Value::Reference(reference) => {
            let target: ReferenceTarget = reference.target.parse()?;
            let address = target.address();
            let declaration =
                set.declaration(&address)
                    .ok_or_else(|| OutpostError::DanglingReference {
                        address: address.clone(),
                        target: address.clone(),
                    })?;
            let prefix = if declaration.data { "data." } else { "" };
            json!(format!(
                "${{{}{}.{}.{}}}",
                prefix,
                engine_type_of(set, declaration)?,
                target.name,
                target.attribute
            ))
        }
        Value::Bool(b) => json!(b),
        Value::Integer(i) => json!(i),
        Value::Float(f) => Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| OutpostError::InvalidConfig {
                message: format!("{} is not a representable number", f),
            })?,
        Value::String(s) => json!(escape_template(s)),
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| render_value(set, item))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Map(entries) => {
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key.clone(), render_value(set, value)?);
            }
            map.into()
        }
    };
    Ok(rendered)
}

/// Literal strings must not be read as interpolations by the engine
fn escape_template(s: &str) -> String {
    s.replace("${", "$${").replace("%{", "%%{")
}
