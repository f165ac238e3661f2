//! The transition table.

use practicas_state::PracticeState::{self, *};

use crate::notify::MessageKind;

/// Legal targets from `from`. Terminal states have none.
pub fn allowed_targets(from: PracticeState) -> &'static [PracticeState] {
    match from {
        Pendiente => &[PendienteAceptacionDocente, Anulada],
        PendienteAceptacionDocente => &[EnCurso, RechazadaDocente, Anulada],
        RechazadaDocente => &[PendienteAceptacionDocente, Anulada],
        EnCurso => &[FinalizadaPendienteEval, Anulada],
        FinalizadaPendienteEval => &[EvaluacionCompleta, Anulada],
        EvaluacionCompleta => &[Cerrada, Anulada],
        Cerrada | Anulada => &[],
    }
}

pub fn is_allowed(from: PracticeState, to: PracticeState) -> bool {
    allowed_targets(from).contains(&to)
}

/// Notification emitted when a practice enters `to`, if any.
pub fn milestone(to: PracticeState) -> Option<MessageKind> {
    match to {
        PendienteAceptacionDocente => Some(MessageKind::SupervisionRequested),
        EnCurso => Some(MessageKind::PracticeStarted),
        FinalizadaPendienteEval => Some(MessageKind::EvaluationRequested),
        Cerrada => Some(MessageKind::PracticeClosed),
        _ => None,
    }
}
