//! Handoff to the external generation service.

use crate::context::AssembledContext;

/// The answer given when retrieval found nothing relevant. Generation is
/// never called with an empty context.
pub const NO_CONTEXT_REPLY: &str = "Actualmente no tengo información cargada en mi base documental \
relacionada con tu consulta. Es posible que el documento aún no haya sido \
cargado en el sistema o que no contenga ese contenido. Si lo deseas, puedo \
intentar ayudarte con otra pregunta relacionada.";

/// Build the instruction sent to the generation model: answer from the
/// supplied passages only, quoting them where possible.
///
/// Returns `None` for an empty context; callers reply with
/// [`NO_CONTEXT_REPLY`] instead.
pub fn grounded_prompt(
    query: &str,
    context: &AssembledContext,
) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    Some(format!(
        "Con base únicamente en los siguientes fragmentos de la documentación \
         institucional:\n\n\
         «{}»\n\n\
         Responde a la siguiente pregunta del usuario, sin inventar información \
         y citando textualmente cuando sea posible. Si los fragmentos no \
         contienen la respuesta, dilo.\n\n\
         Pregunta: {}\n\n\
         Respuesta:",
        context.text,
        query.trim()
    ))
}

/// The prompt for `context`, or the fixed reply when there is nothing to
/// ground an answer on.
pub fn prompt_or_reply(query: &str, context: &AssembledContext) -> String {
    grounded_prompt(query, context)
        .unwrap_or_else(|| NO_CONTEXT_REPLY.to_string())
}
