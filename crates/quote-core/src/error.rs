//! Coordinator error taxonomy, mapped 1:1 to spec.md §7's error table.

use quote_ledger::LedgerError;
use quote_llm::AnalysisError;
use quote_shopping::ShoppingError;
use quote_storage::StorageError;
use quote_vehicle::FipeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
	#[error("rate limited by an external provider")]
	RateLimit,
	#[error("LLM provider overloaded")]
	ProviderOverload,
	#[error("analysis produced no usable query")]
	QueryEmpty,
	#[error("aggregator returned no usable candidates")]
	NoCandidates,
	#[error("block search exhausted its escalation budget")]
	BlockSearchExhausted,
	#[error("FIPE lookup unreachable and no shopping fallback available")]
	FipeUnreachable,
	#[error("request was cancelled")]
	Cancelled,
	#[error("storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("shopping provider error: {0}")]
	Shopping(#[from] ShoppingError),
	#[error("analysis provider error: {0}")]
	Analysis(#[from] AnalysisError),
	#[error("vehicle sub-pipeline error: {0}")]
	Vehicle(#[from] FipeError),
	#[error("ledger error: {0}")]
	Ledger(#[from] LedgerError),
	#[error("internal error: {0}")]
	Internal(String),
}

impl CoordinatorError {
	/// Short, localized, non-sensitive message safe to store in
	/// `QuoteRequest.error_message` (spec.md §7 "User-visible messages").
	pub fn user_message(&self) -> String {
		match self {
			CoordinatorError::RateLimit => "O provedor externo limitou as requisições; tente novamente em instantes.".to_string(),
			CoordinatorError::ProviderOverload => "O provedor de IA está sobrecarregado; tente novamente em instantes.".to_string(),
			CoordinatorError::QueryEmpty => "Não foi possível extrair uma consulta de busca a partir do item informado.".to_string(),
			CoordinatorError::NoCandidates => "Nenhum resultado válido foi encontrado para este item.".to_string(),
			CoordinatorError::BlockSearchExhausted => "Não foi possível reunir cotações suficientes dentro da variação de preço permitida.".to_string(),
			CoordinatorError::FipeUnreachable => "Não foi possível consultar a tabela FIPE para este veículo.".to_string(),
			CoordinatorError::Cancelled => "Cotação cancelada pelo usuário.".to_string(),
			CoordinatorError::Storage(_) => "Erro interno de armazenamento.".to_string(),
			CoordinatorError::Shopping(_) => "Erro ao consultar o agregador de compras.".to_string(),
			CoordinatorError::Analysis(_) => "Erro ao analisar o item com IA.".to_string(),
			CoordinatorError::Vehicle(_) => "Erro ao consultar a tabela FIPE.".to_string(),
			CoordinatorError::Ledger(_) => "Erro interno de contabilização de custos.".to_string(),
			CoordinatorError::Internal(_) => "Erro interno inesperado.".to_string(),
		}
	}
}
