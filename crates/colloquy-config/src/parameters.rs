use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sampling and output parameters for chat requests
///
/// Values set on a per-call instance override the configured defaults
/// field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatParameters {
    /// Sampling temperature, `0.0..=2.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Nucleus sampling mass, `0.0..=1.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Completion token cap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// `-2.0..=2.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// `-2.0..=2.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    /// Best-effort deterministic sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Output format constraint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Return log probabilities of the output tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<bool>,
    /// Alternatives returned per token position, `0..=20`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_logprobs: Option<u8>,
    /// Token id to bias, `-100..=100`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logit_bias: Option<BTreeMap<String, i32>>,
}

/// `response_format` request field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: ResponseFormatType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatType {
    Text,
    JsonObject,
}

impl ResponseFormat {
    pub const TEXT: Self = Self {
        format_type: ResponseFormatType::Text,
    };
    pub const JSON_OBJECT: Self = Self {
        format_type: ResponseFormatType::JsonObject,
    };
}

impl ChatParameters {
    /// Fill every unset field from `defaults`
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            presence_penalty: self.presence_penalty.or(defaults.presence_penalty),
            frequency_penalty: self.frequency_penalty.or(defaults.frequency_penalty),
            seed: self.seed.or(defaults.seed),
            response_format: self.response_format.or(defaults.response_format),
            logprobs: self.logprobs.or(defaults.logprobs),
            top_logprobs: self.top_logprobs.or(defaults.top_logprobs),
            logit_bias: self.logit_bias.or_else(|| defaults.logit_bias.clone()),
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Request log probabilities with `top` alternatives per token
    #[must_use]
    pub fn with_log_probabilities(mut self, top: u8) -> Self {
        self.logprobs = Some(true);
        self.top_logprobs = Some(top);
        self
    }

    /// Bias a token id, `-100` bans it and `100` forces it
    #[must_use]
    pub fn with_logit_bias(mut self, token: u32, bias: i32) -> Self {
        self.logit_bias.get_or_insert_with(BTreeMap::new).insert(token.to_string(), bias);
        self
    }

    /// Range check, returns a description of the first offending field
    pub(crate) fn check(&self) -> Result<(), String> {
        in_range("temperature", self.temperature, 0.0, 2.0)?;
        in_range("top_p", self.top_p, 0.0, 1.0)?;
        in_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;
        in_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;

        if self.max_tokens == Some(0) {
            return Err("max_tokens must be greater than zero".to_owned());
        }

        if let Some(top) = self.top_logprobs.filter(|top| *top > MAX_TOP_LOGPROBS) {
            return Err(format!("top_logprobs must be within 0..={MAX_TOP_LOGPROBS}, got {top}"));
        }

        for (token, bias) in self.logit_bias.iter().flatten() {
            if token.parse::<u32>().is_err() {
                return Err(format!("logit_bias keys must be token ids, got `{token}`"));
            }
            if !(-100..=100).contains(bias) {
                return Err(format!("logit_bias for token {token} must be within -100..=100, got {bias}"));
            }
        }

        Ok(())
    }
}

const MAX_TOP_LOGPROBS: u8 = 20;

fn in_range(name: &str, value: Option<f32>, min: f32, max: f32) -> Result<(), String> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(format!("{name} must be within {min}..={max}, got {v}")),
        _ => Ok(()),
    }
}

/// Parameters for embedding requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingParameters {
    /// Output vector size, for models that support truncation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
}

impl EmbeddingParameters {
    #[must_use]
    pub fn or(self, defaults: &Self) -> Self {
        Self {
            dimensions: self.dimensions.or(defaults.dimensions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_values_win() {
        let defaults = ChatParameters::default().with_temperature(0.2).with_max_tokens(100);
        let call = ChatParameters::default().with_temperature(0.9);

        let merged = call.or(&defaults);
        assert_eq!(merged.temperature, Some(0.9));
        assert_eq!(merged.max_tokens, Some(100));
        assert_eq!(merged.top_p, None);
    }

    #[test]
    fn unset_fields_are_not_serialized() {
        let params = ChatParameters::default().with_response_format(ResponseFormat::JSON_OBJECT);
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json, serde_json::json!({ "response_format": { "type": "json_object" } }));
    }

    #[test]
    fn log_probability_settings_are_layered_and_serialized() {
        let defaults = ChatParameters::default().with_log_probabilities(5).with_logit_bias(50256, -100);
        let call = ChatParameters::default().with_log_probabilities(2);

        let merged = call.or(&defaults);
        assert_eq!(merged.top_logprobs, Some(2));
        assert!(merged.check().is_ok());

        let json = serde_json::to_value(&merged).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "logprobs": true, "top_logprobs": 2, "logit_bias": { "50256": -100 } })
        );
    }

    #[test]
    fn log_probability_ranges_are_checked() {
        assert!(ChatParameters::default().with_log_probabilities(20).check().is_ok());
        assert!(ChatParameters::default().with_log_probabilities(21).check().is_err());
        assert!(ChatParameters::default().with_logit_bias(42, 101).check().is_err());
        assert!(ChatParameters::default().with_logit_bias(42, -100).check().is_ok());

        let named = ChatParameters {
            logit_bias: Some([("hello".to_owned(), 1)].into()),
            ..ChatParameters::default()
        };
        assert!(named.check().is_err());
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(ChatParameters::default().with_temperature(2.5).check().is_err());
        assert!(ChatParameters::default().with_top_p(-0.1).check().is_err());
        assert!(ChatParameters::default().with_max_tokens(0).check().is_err());
        assert!(ChatParameters::default().with_temperature(1.0).check().is_ok());
    }
}
