//! テンプレート展開機能
//!
//! Teraを使用して Composition の文字列補間を行います。
//! コンテキストは呼び出し側が明示的に与える値のみで構成され、
//! 環境変数や時刻は一切参照しません（展開結果は入力のみで決まる）。

use crate::error::{CoreError, Result};
use serde_json::Value;
use tera::{Context, Tera};

/// テンプレートプロセッサ
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// JSONオブジェクトからコンテキストを構築
    ///
    /// オブジェクト以外はエラー。
    pub fn from_value(value: &Value) -> Result<Self> {
        let context = Context::from_value(value.clone())
            .map_err(|e| CoreError::TemplateRenderError(extract_tera_error_detail(&e)))?;
        Ok(Self {
            tera: Tera::default(),
            context,
        })
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: &Value) {
        self.context.insert(key.into(), value);
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| CoreError::TemplateRenderError(extract_tera_error_detail(&e)))
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Teraエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    // "Variable `xxx` not found in context"
    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!("未定義の変数: `{}`", var_name);
    }

    full_error
}
