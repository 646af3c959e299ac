use serde::{Deserialize, Serialize};

/// Expected shape of a code unit's entry function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedSignature {
    /// `None` when no parameter list was declared; only then is the
    /// parameter check skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<ExpectedParam>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ExpectedSignature {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inputs: Some(names.into_iter().map(ExpectedParam::named).collect()),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn input_names(&self) -> Option<impl Iterator<Item = &str>> {
        self.inputs
            .as_ref()
            .map(|inputs| inputs.iter().map(|p| p.name.as_str()))
    }
}

/// One expected parameter. Accepts either `"amount"` or
/// `{"name": "amount", "type": "float"}` on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ExpectedParamRepr")]
pub struct ExpectedParam {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
}

impl ExpectedParam {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
        }
    }

    pub fn typed(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Some(ty.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpectedParamRepr {
    Name(String),
    Typed {
        name: String,
        #[serde(rename = "type", default)]
        ty: Option<String>,
    },
}

impl From<ExpectedParamRepr> for ExpectedParam {
    fn from(repr: ExpectedParamRepr) -> Self {
        match repr {
            ExpectedParamRepr::Name(name) => ExpectedParam::named(name.trim()),
            ExpectedParamRepr::Typed { name, ty } => ExpectedParam {
                name: name.trim().to_string(),
                ty: ty.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            },
        }
    }
}
