use std::sync::Arc;

use serde_json::json;

use crate::unit::{DefinitionError, EntryPoint, Reply, UnitDefinition};

pub const ECHO: &str = "Echo";

/// `POST /echo {"input": "..."}` answers with the input string.
pub fn echo() -> Result<Arc<UnitDefinition>, DefinitionError> {
    UnitDefinition::builder(ECHO)
        .doc("Returns its input unchanged.")
        .source_text("echo.rs", include_str!("echo.rs"))
        .entry_point(
            EntryPoint::blocking("echo", |_ctx, args| {
                let input: String = args.get("input")?;
                Ok(Reply::json(input))
            })
            .param::<String>("input")
            .returns::<String>()
            .example(json!({"input": "hello"}))
            .doc("Echo the input back."),
        )
        .build()
}
